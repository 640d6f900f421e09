use crate::book::PriceBook;
use crate::quote::QuoteTracker;
use crate::series::{LiveSeries, SeriesChange};
use crate::session::MarketSessionResolver;
use crate::task::{FirstTick, ScheduledTask};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kairos_core::common::{ChartPeriod, Instrument};
use kairos_core::config::RefresherConfig;
use kairos_core::market::entity::{
    MarketCalendarSnapshot, MarketHoursConfig, RefresherEvent, RefresherSnapshot, RefresherState,
    SessionState, TradingSession,
};
use kairos_core::market::port::{MarketDataProvider, QuoteRefresher, RefresherEventStream};
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// # Summary
/// 详情页实时报价刷新器。
///
/// # Invariants
/// - 所有定时器句柄存放在受互斥锁保护的视图状态中，状态迁移时同步释放。
/// - 网络请求期间从不持有锁；请求返回后通过 `generation` 丢弃过期结果。
/// - 后台任务仅持有内部状态的弱引用，刷新器销毁后任务自动退出。
pub struct LiveQuoteRefresher {
    inner: Arc<RefresherInner>,
}

struct RefresherInner {
    // 券商代理数据源
    provider: Arc<dyn MarketDataProvider>,
    // 交易时段解析器 (同时提供时钟)
    resolver: MarketSessionResolver,
    // 最近成交价簿
    book: Arc<PriceBook>,
    // 调度参数
    config: RefresherConfig,
    // 视图状态
    view: Mutex<ViewState>,
    // 事件广播
    events: broadcast::Sender<RefresherEvent>,
}

struct ViewState {
    instrument: Option<Instrument>,
    state: RefresherState,
    period: ChartPeriod,
    manual_period: bool,
    // 每次打开/关闭/切换标的时递增，用于识别过期的异步结果
    generation: u64,
    quote: QuoteTracker,
    series: LiveSeries,
    hours: MarketHoursConfig,
    snapshot: Option<MarketCalendarSnapshot>,
    session: Option<SessionState>,
    // 进入 Suspended 后是否已执行过补抓
    closed_tick_spent: bool,
    timers: Timers,
}

#[derive(Default)]
struct Timers {
    // 快速报价轮询
    quote: Option<ScheduledTask>,
    // 实时模式 K 线重拉
    bars: Option<ScheduledTask>,
    // 交易日历刷新
    clock: Option<ScheduledTask>,
    // 涨跌方向自动清除
    clear: Option<ScheduledTask>,
}

impl Timers {
    fn release(&mut self) {
        *self = Self::default();
    }
}

impl LiveQuoteRefresher {
    /// # Summary
    /// 创建处于 Idle 状态的刷新器。
    ///
    /// # Arguments
    /// * `provider`: 券商代理数据源。
    /// * `resolver`: 交易时段解析器。
    /// * `book`: 共享的最近成交价簿。
    /// * `config`: 调度参数。
    /// * `hours`: 拿到 `market-hours` 响应之前使用的时段边界。
    ///
    /// # Returns
    /// 刷新器实例。
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        resolver: MarketSessionResolver,
        book: Arc<PriceBook>,
        config: RefresherConfig,
        hours: MarketHoursConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let view = ViewState {
            instrument: None,
            state: RefresherState::Idle,
            period: ChartPeriod::DEFAULT_LOOKBACK,
            manual_period: false,
            generation: 0,
            quote: QuoteTracker::new(config.change_threshold),
            series: LiveSeries::new(config.series_capacity, config.bucket_secs),
            hours,
            snapshot: None,
            session: None,
            closed_tick_spent: false,
            timers: Timers::default(),
        };

        Self {
            inner: Arc::new(RefresherInner {
                provider,
                resolver,
                book,
                config,
                view: Mutex::new(view),
                events,
            }),
        }
    }
}

impl RefresherInner {
    fn view(&self) -> MutexGuard<'_, ViewState> {
        self.view.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn now(&self) -> DateTime<Utc> {
        self.resolver.clock().now()
    }

    fn emit(&self, event: RefresherEvent) {
        if self.events.send(event).is_err() {
            debug!("No event subscribers");
        }
    }

    // 实时模式下的股票类标的只保留当日盘前开始之后的点
    fn retain_from(&self, view: &ViewState, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let instrument = view.instrument.as_ref()?;
        if !view.period.is_live() || instrument.trades_around_the_clock() {
            return None;
        }
        self.resolver.trading_day_start(now, &view.hours)
    }

    /// # Summary
    /// 挂载快速报价与交易日历两个常驻定时器。
    fn arm_polling(self: &Arc<Self>, view: &mut ViewState) {
        let weak = Arc::downgrade(self);
        view.timers.quote = Some(ScheduledTask::every(
            "quote",
            self.config.quote_interval(),
            FirstTick::Immediate,
            move || {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(inner) => {
                            inner.poll_quote().await;
                            ControlFlow::Continue(())
                        }
                        None => ControlFlow::Break(()),
                    }
                }
            },
        ));

        let weak = Arc::downgrade(self);
        view.timers.clock = Some(ScheduledTask::every(
            "market-clock",
            self.config.clock_interval(),
            FirstTick::AfterPeriod,
            move || {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(inner) => {
                            if inner.refresh_clock().await {
                                inner.reseed().await;
                            }
                            ControlFlow::Continue(())
                        }
                        None => ControlFlow::Break(()),
                    }
                }
            },
        ));
    }

    /// # Summary
    /// 按当前周期挂载或卸载 K 线重拉定时器。
    ///
    /// # Logic
    /// 1. 仅在非 Idle 且周期为 `Live` 时挂载，首次触发在一个完整周期之后。
    /// 2. 其余情况释放已有定时器。
    fn arm_bars(self: &Arc<Self>, view: &mut ViewState) {
        if view.state == RefresherState::Idle || !view.period.is_live() {
            view.timers.bars = None;
            return;
        }

        let weak = Arc::downgrade(self);
        view.timers.bars = Some(ScheduledTask::every(
            "bars",
            self.config.bars_interval(),
            FirstTick::AfterPeriod,
            move || {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(inner) => {
                            inner.refresh_bars().await;
                            ControlFlow::Continue(())
                        }
                        None => ControlFlow::Break(()),
                    }
                }
            },
        ));
    }

    fn schedule_direction_clear(self: &Arc<Self>, generation: u64) -> ScheduledTask {
        let weak = Arc::downgrade(self);
        ScheduledTask::after(
            "direction-clear",
            self.config.change_clear_delay(),
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.clear_direction(generation);
                }
            },
        )
    }

    fn clear_direction(&self, generation: u64) {
        let mut view = self.view();
        if view.generation == generation && view.quote.clear_direction().is_some() {
            self.emit(RefresherEvent::DirectionChanged(None));
        }
    }

    /// # Summary
    /// 重新解析交易时段，并据此驱动状态机与自动周期切换。
    ///
    /// # Logic
    /// 1. 用当前时段配置与日历快照解析会话，仅在时段变化时继续。
    /// 2. 非加密标的遇到休市进入 Suspended，其余情况为 Polling。
    /// 3. 未手动选择周期时：开放时段切到 `Live`，休市切回默认回看区间。
    ///
    /// # Returns
    /// 周期是否被自动切换 (需要重新播种序列)。
    fn evaluate_session(self: &Arc<Self>, view: &mut ViewState) -> bool {
        let resolved = self.resolver.resolve(&view.hours, view.snapshot.as_ref());
        let current = resolved.current_session;
        let previous = view.session.replace(resolved.clone()).map(|s| s.current_session);
        if previous == Some(current) {
            return false;
        }

        let around_clock = view
            .instrument
            .as_ref()
            .is_some_and(Instrument::trades_around_the_clock);
        info!("Trading session changed: {:?} -> {}", previous, current);
        self.emit(RefresherEvent::SessionChanged(Box::new(resolved)));

        if view.state != RefresherState::Idle {
            let next = if !around_clock && current == TradingSession::Closed {
                RefresherState::Suspended
            } else {
                RefresherState::Polling
            };
            if next != view.state {
                if next == RefresherState::Suspended {
                    view.closed_tick_spent = false;
                }
                info!("Refresher state {:?} -> {:?}", view.state, next);
                view.state = next;
                self.emit(RefresherEvent::StateChanged(next));
            }
        }

        if view.manual_period {
            return false;
        }
        let target = if around_clock || current.is_open() {
            ChartPeriod::Live
        } else {
            ChartPeriod::DEFAULT_LOOKBACK
        };
        if target == view.period {
            return false;
        }

        info!("Auto switching chart period {} -> {}", view.period, target);
        view.period = target;
        self.emit(RefresherEvent::PeriodChanged {
            period: target,
            manual: false,
        });
        self.arm_bars(view);
        true
    }

    /// # Summary
    /// 快速报价轮询的单次执行。
    ///
    /// # Logic
    /// 1. 重新解析交易时段；Suspended 状态下只补抓一次，之后跳过抓取。
    /// 2. 拉取最新价，失败仅记录日志。
    /// 3. 写入价格簿，价差超过阈值时设置涨跌方向并重启清除定时器。
    /// 4. `Live` 周期下按 5 分钟桶更新或追加价格点。
    async fn poll_quote(self: &Arc<Self>) {
        let (instrument, generation, reseed, fetch) = {
            let mut view = self.view();
            if view.state == RefresherState::Idle {
                return;
            }
            let Some(instrument) = view.instrument.clone() else {
                return;
            };
            let reseed = self.evaluate_session(&mut view);
            let fetch = match view.state {
                RefresherState::Suspended if view.closed_tick_spent => false,
                RefresherState::Suspended => {
                    view.closed_tick_spent = true;
                    true
                }
                _ => true,
            };
            (instrument, view.generation, reseed, fetch)
        };

        if reseed {
            self.reseed().await;
        }
        if !fetch {
            debug!("Market closed for {}, skipping quote tick", instrument.symbol);
            return;
        }

        let price = match self.provider.latest_price(&instrument).await {
            Ok(price) => price,
            Err(e) => {
                warn!("Latest price fetch for {} failed: {}", instrument.symbol, e);
                return;
            }
        };

        let now = self.now();
        let mut view = self.view();
        if view.generation != generation || view.state == RefresherState::Idle {
            debug!("Discarding stale quote for {}", instrument.symbol);
            return;
        }

        self.book.record(&instrument.symbol, price, now);
        self.emit(RefresherEvent::PriceUpdated {
            symbol: instrument.symbol.clone(),
            price,
            at: now,
        });

        if let Some(direction) = view.quote.observe(price) {
            debug!("{} moved {:?} to {}", instrument.symbol, direction, price);
            self.emit(RefresherEvent::DirectionChanged(Some(direction)));
            view.timers.clear = Some(self.schedule_direction_clear(generation));
        }

        if view.period.is_live() {
            let retain = self.retain_from(&view, now);
            match view.series.record(price, now, retain) {
                SeriesChange::Ignored => {
                    debug!("Stale tick for {} ignored", instrument.symbol);
                }
                change => {
                    if change == (SeriesChange::Appended { evicted: true }) {
                        debug!("Live series for {} full, oldest point evicted", instrument.symbol);
                    }
                    let len = view.series.len();
                    self.emit(RefresherEvent::SeriesUpdated { len });
                }
            }
        }
    }

    /// # Summary
    /// 刷新交易日历快照与时段边界。
    ///
    /// # Logic
    /// 1. 依次拉取 `market-clock` 与 `market-hours`。
    /// 2. 日历失败时保留旧快照，时段失败时保留当前边界。
    /// 3. 重新解析交易时段。
    ///
    /// # Returns
    /// 周期是否被自动切换。
    async fn refresh_clock(self: &Arc<Self>) -> bool {
        let generation = {
            let view = self.view();
            if view.state == RefresherState::Idle {
                return false;
            }
            view.generation
        };

        let clock = self.provider.market_clock().await;
        let hours = self.provider.market_hours().await;

        let mut view = self.view();
        if view.generation != generation {
            return false;
        }
        match clock {
            Ok(snapshot) => view.snapshot = Some(snapshot),
            Err(e) => warn!("Market clock refresh failed, keeping previous snapshot: {}", e),
        }
        match hours {
            Ok(hours) => view.hours = hours,
            Err(e) => warn!("Market hours refresh failed, keeping current boundaries: {}", e),
        }
        self.evaluate_session(&mut view)
    }

    // 定时重拉 K 线，Suspended 时跳过
    async fn refresh_bars(self: &Arc<Self>) {
        let polling = self.view().state == RefresherState::Polling;
        if polling {
            self.reseed().await;
        }
    }

    /// # Summary
    /// 按当前周期从后端重新播种价格序列。
    ///
    /// # Logic
    /// 1. 记录发起请求时的标的、周期与 generation。
    /// 2. 拉取 K 线，失败仅记录日志。
    /// 3. 若期间标的或周期已变化则丢弃结果，否则整体替换序列。
    async fn reseed(self: &Arc<Self>) {
        let (instrument, period, generation) = {
            let view = self.view();
            match &view.instrument {
                Some(i) if view.state != RefresherState::Idle => {
                    (i.clone(), view.period, view.generation)
                }
                _ => return,
            }
        };

        let bars = match self
            .provider
            .bars(&instrument, period.lookback(), period.timeframe())
            .await
        {
            Ok(bars) => bars,
            Err(e) => {
                warn!("Bars fetch for {} ({}) failed: {}", instrument.symbol, period, e);
                return;
            }
        };

        let now = self.now();
        let mut view = self.view();
        if view.generation != generation || view.period != period {
            debug!("Discarding stale bars for {} ({})", instrument.symbol, period);
            return;
        }
        let retain = self.retain_from(&view, now);
        view.series.seed(&bars, retain, period.is_live());
        let len = view.series.len();
        debug!("Seeded {} points for {} ({})", len, instrument.symbol, period);
        self.emit(RefresherEvent::SeriesUpdated { len });
    }
}

#[async_trait]
impl QuoteRefresher for LiveQuoteRefresher {
    /// # Summary
    /// 打开标的详情页。
    ///
    /// # Logic
    /// 1. 已在跟踪同一标的时直接返回。
    /// 2. 释放旧定时器，重置报价、序列、手动周期标记，进入 Polling。
    /// 3. 挂载快速报价与交易日历定时器。
    /// 4. 立即刷新一次交易日历 (可能触发状态迁移与自动周期切换)，再播种序列。
    async fn open(&self, instrument: Instrument) {
        {
            let mut view = self.inner.view();
            if view.state != RefresherState::Idle && view.instrument.as_ref() == Some(&instrument) {
                debug!("{} already open", instrument.symbol);
                return;
            }

            view.timers.release();
            view.generation = view.generation.wrapping_add(1);
            view.instrument = Some(instrument.clone());
            view.quote.reset();
            view.series.clear();
            view.manual_period = false;
            view.period = ChartPeriod::DEFAULT_LOOKBACK;
            view.session = None;
            view.closed_tick_spent = false;
            view.state = RefresherState::Polling;

            info!(
                "Detail view opened for {} ({})",
                instrument.symbol, instrument.asset_class
            );
            self.inner
                .emit(RefresherEvent::StateChanged(RefresherState::Polling));
            self.inner.emit(RefresherEvent::PeriodChanged {
                period: view.period,
                manual: false,
            });
            self.inner.arm_polling(&mut view);
        }

        self.inner.refresh_clock().await;
        self.inner.reseed().await;
    }

    /// # Summary
    /// 手动切换图表周期。
    ///
    /// # Logic
    /// 1. Idle 状态下忽略。
    /// 2. 设置手动标记与新周期，按需挂载 K 线定时器。
    /// 3. 按新周期重新播种序列。
    async fn select_period(&self, period: ChartPeriod) {
        {
            let mut view = self.inner.view();
            if view.state == RefresherState::Idle {
                debug!("Ignoring period selection {} while idle", period);
                return;
            }
            info!("Chart period manually set to {}", period);
            view.manual_period = true;
            view.period = period;
            self.inner.emit(RefresherEvent::PeriodChanged {
                period,
                manual: true,
            });
            self.inner.arm_bars(&mut view);
        }

        self.inner.reseed().await;
    }

    /// # Summary
    /// 关闭详情页，释放全部定时器并清空瞬态数据。
    fn close(&self) {
        let mut view = self.inner.view();
        if view.state == RefresherState::Idle {
            return;
        }

        view.timers.release();
        view.generation = view.generation.wrapping_add(1);
        if let Some(instrument) = view.instrument.take() {
            info!("Detail view closed for {}", instrument.symbol);
        }
        view.quote.reset();
        view.series.clear();
        view.manual_period = false;
        view.session = None;
        view.state = RefresherState::Idle;
        self.inner
            .emit(RefresherEvent::StateChanged(RefresherState::Idle));
    }

    fn snapshot(&self) -> RefresherSnapshot {
        let view = self.inner.view();
        RefresherSnapshot {
            instrument: view.instrument.clone(),
            state: view.state,
            period: view.period,
            manual_period: view.manual_period,
            quote: view.quote.state(),
            session: view.session.clone(),
            series: view.series.points(),
        }
    }

    /// # Summary
    /// 订阅刷新器事件。
    ///
    /// # Logic
    /// 挂载到内部广播器；消费过慢导致的丢包只记录日志，不中断流。
    fn subscribe(&self) -> RefresherEventStream {
        let mut rx = self.inner.events.subscribe();
        let stream = async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Event subscriber lagged, {} events skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };
        Box::pin(stream)
    }
}
