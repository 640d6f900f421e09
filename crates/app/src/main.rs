mod settings;

use std::sync::Arc;

use futures::StreamExt;
use kairos_core::common::Instrument;
use kairos_core::common::time::{RealTimeProvider, TimeProvider};
use kairos_core::market::entity::{MarketHoursConfig, RefresherEvent};
use kairos_core::market::port::QuoteRefresher;
use kairos_feed::brokerage::BrokerageProxyProvider;
use kairos_market::book::PriceBook;
use kairos_market::refresher::LiveQuoteRefresher;
use kairos_market::session::MarketSessionResolver;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// # Summary
/// 应用启动入口，纯粹的 DI 容器。
/// 负责实例化数据源、时钟与刷新器，并打开配置中的标的详情页。
///
/// # Logic
/// 1. 初始化全局日志。
/// 2. 加载配置 (kairos.toml + KAIROS__ 环境变量)。
/// 3. 实例化基础设施层 (Feed、Clock)。
/// 4. 实例化领域实现层 (Resolver、PriceBook、Refresher)。
/// 5. 打开详情页并输出事件，挂起等待外部信号退出。
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. 初始化日志，guard 存活期间后台写线程持续刷新
    let _log_guard = init_tracing();
    info!("Kairos starting...");

    // 2. 加载配置
    let config = settings::load()?;
    debug!("Loaded configuration: {:?}", config);

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("TLS crypto provider already installed");
    }

    // 3. 实例化基础设施层
    let feed = Arc::new(BrokerageProxyProvider::new(&config.feed)?);
    let clock: Arc<dyn TimeProvider> = Arc::new(RealTimeProvider);
    info!("Brokerage proxy at {}", feed.base_url());

    // 4. 实例化领域实现层
    let resolver = MarketSessionResolver::new(config.session.viewer_utc_offset_hours, clock);
    let book = Arc::new(PriceBook::new());
    let refresher = LiveQuoteRefresher::new(
        feed,
        resolver,
        book.clone(),
        config.refresher.clone(),
        MarketHoursConfig::from_text(&config.session.market_hours),
    );

    // 5. 打开详情页
    let mut events = refresher.subscribe();
    let reporter = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            report(&event);
        }
    });

    let instrument = Instrument::new(config.watch.symbol.clone(), config.watch.asset_class);
    refresher.open(instrument.clone()).await;
    info!("Watching {}. Waiting for signals...", instrument.symbol);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting...");

    refresher.close();
    reporter.abort();
    if let Some(entry) = book.get(&instrument.symbol) {
        info!(
            "Last known price for {}: {} at {}",
            instrument.symbol, entry.price, entry.updated_at
        );
    }

    Ok(())
}

/// # Summary
/// 初始化日志：`RUST_LOG` 控制过滤级别 (默认 info)，经非阻塞写入器输出到 stdout。
fn init_tracing() -> WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .init();
    guard
}

fn report(event: &RefresherEvent) {
    match event {
        RefresherEvent::PriceUpdated { symbol, price, at } => {
            info!("{} last {} at {}", symbol, price, at);
        }
        RefresherEvent::DirectionChanged(Some(direction)) => {
            info!("Price moved {:?}", direction);
        }
        RefresherEvent::DirectionChanged(None) => debug!("Direction cleared"),
        RefresherEvent::SessionChanged(session) => {
            info!(
                "Session {} (open: {}, exchange DST: {}), regular hours {}-{} ET / {}-{} local",
                session.current_session,
                session.is_market_open,
                session.exchange_dst,
                session.exchange.regular_start,
                session.exchange.regular_end,
                session.viewer.regular_start,
                session.viewer.regular_end
            );
        }
        RefresherEvent::PeriodChanged { period, manual } => {
            info!("Chart period {} (manual: {})", period, manual);
        }
        RefresherEvent::StateChanged(state) => info!("Refresher {:?}", state),
        RefresherEvent::SeriesUpdated { len } => debug!("Series holds {} points", len),
    }
}
