use crate::common::{ChartPeriod, Instrument, TimeFrame};
use crate::market::entity::{
    Bar, MarketCalendarSnapshot, MarketHoursConfig, RefresherEvent, RefresherSnapshot,
};
use crate::market::error::MarketError;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// # Summary
/// 刷新器事件流别名，使用动态分发的异步流。
pub type RefresherEventStream = Pin<Box<dyn Stream<Item = RefresherEvent> + Send>>;

/// # Summary
/// 券商代理行情接口 (原始数据源)。
///
/// # Invariants
/// - 实现者不做重试，瞬时错误原样返回，由调用方按固定周期重试。
/// - 响应必须解析为强类型实体，缺失字段按约定替换为默认值。
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// # Summary
    /// 获取标的最新成交价。
    ///
    /// # Arguments
    /// * `instrument`: 交易标的。
    ///
    /// # Returns
    /// 成功返回最新价，报价缺失返回 `MarketError::NotFound`。
    async fn latest_price(&self, instrument: &Instrument) -> Result<f64, MarketError>;

    /// # Summary
    /// 获取标的在指定回看区间内的 K 线。
    ///
    /// # Logic
    /// 1. 以 `period` 与 `timeframe` 构建请求。
    /// 2. 解析为按时间升序的 K 线列表。
    ///
    /// # Arguments
    /// * `instrument`: 交易标的。
    /// * `period`: 回看区间 (如 "1D", "1W")。
    /// * `timeframe`: K 线周期。
    ///
    /// # Returns
    /// 成功返回 K 线列表，可以为空。
    async fn bars(
        &self,
        instrument: &Instrument,
        period: &str,
        timeframe: TimeFrame,
    ) -> Result<Vec<Bar>, MarketError>;

    /// # Summary
    /// 获取交易所日历快照。
    ///
    /// # Returns
    /// 成功返回是否开市以及下一次开/收市时间。
    async fn market_clock(&self) -> Result<MarketCalendarSnapshot, MarketError>;

    /// # Summary
    /// 获取交易时段边界配置。
    ///
    /// # Logic
    /// 1. 拉取六个 `HH:MM` 边界文本。
    /// 2. 非法或缺失的边界回退到默认配置。
    ///
    /// # Returns
    /// 成功返回时段配置。
    async fn market_hours(&self) -> Result<MarketHoursConfig, MarketError>;
}

/// # Summary
/// 详情页实时报价刷新器契约。
///
/// # Invariants
/// - 同一时刻最多只跟踪一个标的。
/// - 所有定时器的生命周期与 Idle/Polling/Suspended 状态机一一绑定。
/// - 任何网络失败都不会向调用方暴露，仅记录日志并在下个周期重试。
#[async_trait]
pub trait QuoteRefresher: Send + Sync {
    /// # Summary
    /// 打开标的详情页，进入轮询状态。
    ///
    /// # Logic
    /// 1. 若已在跟踪同一标的则直接返回。
    /// 2. 否则重置全部瞬态数据，挂载快速报价、日历刷新及 K 线刷新定时器。
    /// 3. 拉取日历快照并按当前周期重新播种价格序列。
    ///
    /// # Arguments
    /// * `instrument`: 交易标的。
    async fn open(&self, instrument: Instrument);

    /// # Summary
    /// 手动切换图表周期。
    ///
    /// # Logic
    /// 1. 记录手动选择标记，抑制自动周期切换。
    /// 2. 按新周期重新播种价格序列，并按需挂载或卸载 K 线刷新定时器。
    ///
    /// # Arguments
    /// * `period`: 目标周期。
    async fn select_period(&self, period: ChartPeriod);

    /// # Summary
    /// 关闭详情页，回到 Idle 并释放所有定时器。
    fn close(&self);

    /// # Summary
    /// 获取当前状态的只读快照。
    fn snapshot(&self) -> RefresherSnapshot;

    /// # Summary
    /// 订阅刷新器事件流。
    ///
    /// # Returns
    /// 返回异步流 RefresherEventStream。
    fn subscribe(&self) -> RefresherEventStream;
}
