use crate::common::{ChartPeriod, Instrument};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 单根 K 线数据实体，对应券商代理 `bars` 接口返回的 `{t,o,h,l,c,v}`。
///
/// # Invariants
/// - `high` 必须大于或等于 `low`, `open`, `close`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    // K 线开始时间
    pub time: DateTime<Utc>,
    // 开盘价
    pub open: f64,
    // 最高价
    pub high: f64,
    // 最低价
    pub low: f64,
    // 收盘价
    pub close: f64,
    // 成交量
    pub volume: f64,
}

/// # Summary
/// 外部交易日历快照，来自券商代理的 `market-clock` 接口。
///
/// # Invariants
/// - 存在时，对节假日与周末休市的判断优先于本地时钟推断。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MarketCalendarSnapshot {
    // 交易所当前是否处于开市状态
    pub is_open: bool,
    // 下一次开市时间
    pub next_open: Option<DateTime<Utc>>,
    // 下一次收市时间
    pub next_close: Option<DateTime<Utc>>,
}

/// # Summary
/// 交易所当地的钟点时间 (`HH:MM`)。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionTime {
    hour: u32,
    minute: u32,
}

impl SessionTime {
    /// 构造钟点时间，越界返回 None。
    pub const fn new(hour: u32, minute: u32) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    /// # Summary
    /// 解析 `HH:MM` 字符串。
    ///
    /// # Logic
    /// 1. 以冒号切分为时、分两段，允许额外的 `:SS` 秒段并忽略之。
    /// 2. 两段都必须是合法数字且不越界。
    ///
    /// # Arguments
    /// * `text`: 原始字符串，如 "09:30"。
    ///
    /// # Returns
    /// 合法则返回钟点时间，否则返回 None。
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.trim().split(':');
        let hour = parts.next()?.trim().parse::<u32>().ok()?;
        let minute = parts.next()?.trim().parse::<u32>().ok()?;
        Self::new(hour, minute)
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    /// 距当日零点的分钟数。
    pub fn minute_of_day(&self) -> u32 {
        self.hour * 60 + self.minute
    }

    /// 十进制小时表示，如 09:30 -> 9.5。
    pub fn decimal_hours(&self) -> f64 {
        f64::from(self.hour) + f64::from(self.minute) / 60.0
    }

    /// 由当日分钟数反推钟点时间，超出一天的部分按 24 小时取模。
    pub fn from_minute_of_day(minutes: u32) -> Self {
        let minutes = minutes % (24 * 60);
        Self {
            hour: minutes / 60,
            minute: minutes % 60,
        }
    }
}

impl std::fmt::Display for SessionTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// # Summary
/// 交易时段边界的原始文本形式，对应 `market-hours` 接口与配置文件。
///
/// # Invariants
/// - 字段缺失表示使用该边界的默认值。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MarketHoursText {
    pub pre_market_start: Option<String>,
    pub pre_market_end: Option<String>,
    pub regular_start: Option<String>,
    pub regular_end: Option<String>,
    pub after_market_start: Option<String>,
    pub after_market_end: Option<String>,
}

/// # Summary
/// 交易所三个交易时段的边界配置，时间均为交易所当地时间。
///
/// # Invariants
/// - 各时段为左闭右开区间 `[start, end)`。
/// - 不校验时段是否重叠，重叠时按 盘前 > 盘中 > 盘后 的优先级匹配。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketHoursConfig {
    pub pre_market_start: SessionTime,
    pub pre_market_end: SessionTime,
    pub regular_start: SessionTime,
    pub regular_end: SessionTime,
    pub after_market_start: SessionTime,
    pub after_market_end: SessionTime,
}

impl Default for MarketHoursConfig {
    fn default() -> Self {
        Self {
            pre_market_start: SessionTime { hour: 4, minute: 0 },
            pre_market_end: SessionTime { hour: 9, minute: 30 },
            regular_start: SessionTime { hour: 9, minute: 30 },
            regular_end: SessionTime { hour: 16, minute: 0 },
            after_market_start: SessionTime { hour: 16, minute: 0 },
            after_market_end: SessionTime { hour: 20, minute: 0 },
        }
    }
}

impl MarketHoursConfig {
    /// # Summary
    /// 由文本边界构造配置。
    ///
    /// # Logic
    /// 1. 缺失的边界取对应默认值。
    /// 2. 任意一个边界格式非法时，整体回退到默认配置。
    ///
    /// # Arguments
    /// * `text`: 原始边界文本。
    ///
    /// # Returns
    /// 始终返回可用的配置。
    pub fn from_text(text: &MarketHoursText) -> Self {
        let defaults = Self::default();
        Self::parse_text(text, &defaults).unwrap_or_else(|| {
            tracing::warn!("Malformed market hours {:?}, falling back to defaults", text);
            defaults
        })
    }

    fn parse_text(text: &MarketHoursText, defaults: &Self) -> Option<Self> {
        let pick = |raw: &Option<String>, fallback: SessionTime| match raw {
            None => Some(fallback),
            Some(s) => SessionTime::parse(s),
        };

        Some(Self {
            pre_market_start: pick(&text.pre_market_start, defaults.pre_market_start)?,
            pre_market_end: pick(&text.pre_market_end, defaults.pre_market_end)?,
            regular_start: pick(&text.regular_start, defaults.regular_start)?,
            regular_end: pick(&text.regular_end, defaults.regular_end)?,
            after_market_start: pick(&text.after_market_start, defaults.after_market_start)?,
            after_market_end: pick(&text.after_market_end, defaults.after_market_end)?,
        })
    }

    /// 按匹配优先级排列的三个交易时段窗口。
    pub fn windows(&self) -> [(TradingSession, SessionTime, SessionTime); 3] {
        [
            (
                TradingSession::PreMarket,
                self.pre_market_start,
                self.pre_market_end,
            ),
            (
                TradingSession::Regular,
                self.regular_start,
                self.regular_end,
            ),
            (
                TradingSession::AfterMarket,
                self.after_market_start,
                self.after_market_end,
            ),
        ]
    }
}

/// # Summary
/// 交易时段枚举。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TradingSession {
    // 盘前
    PreMarket,
    // 盘中
    Regular,
    // 盘后
    AfterMarket,
    // 休市
    Closed,
}

impl TradingSession {
    /// 盘前、盘中、盘后均视为开放时段。
    pub fn is_open(&self) -> bool {
        !matches!(self, TradingSession::Closed)
    }
}

impl std::fmt::Display for TradingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingSession::PreMarket => write!(f, "pre-market"),
            TradingSession::Regular => write!(f, "regular"),
            TradingSession::AfterMarket => write!(f, "after-market"),
            TradingSession::Closed => write!(f, "closed"),
        }
    }
}

/// # Summary
/// 某个时区下格式化好的六个时段边界 (`HH:MM`)。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBoundaries {
    pub pre_market_start: String,
    pub pre_market_end: String,
    pub regular_start: String,
    pub regular_end: String,
    pub after_market_start: String,
    pub after_market_end: String,
}

/// # Summary
/// 会话解析结果，每次渲染或轮询时重新计算，不做持久化。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    // 当前交易时段
    pub current_session: TradingSession,
    // 是否视为开市
    pub is_market_open: bool,
    // 交易所当前是否处于夏令时
    pub exchange_dst: bool,
    // 交易所时区下的边界
    pub exchange: SessionBoundaries,
    // 观察者时区下的边界
    pub viewer: SessionBoundaries,
    // 下一次开市时间 (来自日历快照)
    pub next_open: Option<DateTime<Utc>>,
    // 下一次收市时间 (来自日历快照)
    pub next_close: Option<DateTime<Utc>>,
}

/// # Summary
/// 实时图表上的单个价格点。
///
/// # Invariants
/// - 序列按 `timestamp` 升序排列。
/// - 实时模式下仅最后一个点允许在其 5 分钟桶内被原地更新。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeriesPoint {
    // 所属时间桶的起始时间
    pub timestamp: DateTime<Utc>,
    // 交易所当地时间标签 (HH:MM)
    pub time_label: String,
    // 最新价
    pub price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// # Summary
/// 价格变动方向，用于驱动涨跌闪烁动画。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeDirection {
    Up,
    Down,
}

/// # Summary
/// 当前标的的实时报价状态。
///
/// # Invariants
/// - `change_direction` 为瞬态字段，设置后固定时长自动清空。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct LiveQuoteState {
    pub last_price: Option<f64>,
    pub previous_price: Option<f64>,
    pub change_direction: Option<ChangeDirection>,
}

/// # Summary
/// 实时刷新器状态机。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RefresherState {
    // 未打开详情页，无定时器
    #[default]
    Idle,
    // 详情页已打开，定时轮询中
    Polling,
    // 非加密标的休市，定时器保留但不再抓取
    Suspended,
}

/// # Summary
/// 刷新器对外广播的事件。
#[derive(Debug, Clone, PartialEq)]
pub enum RefresherEvent {
    // 状态机迁移
    StateChanged(RefresherState),
    // 交易时段发生变化
    SessionChanged(Box<SessionState>),
    // 图表周期变化，`manual` 表示是否为用户手动选择
    PeriodChanged { period: ChartPeriod, manual: bool },
    // 拉取到新的成交价
    PriceUpdated {
        symbol: String,
        price: f64,
        at: DateTime<Utc>,
    },
    // 涨跌方向变化，None 表示动画结束
    DirectionChanged(Option<ChangeDirection>),
    // 价格序列被更新或重新播种
    SeriesUpdated { len: usize },
}

/// # Summary
/// 刷新器当前状态的只读快照。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RefresherSnapshot {
    pub instrument: Option<Instrument>,
    pub state: RefresherState,
    pub period: ChartPeriod,
    pub manual_period: bool,
    pub quote: LiveQuoteState,
    pub session: Option<SessionState>,
    pub series: Vec<PriceSeriesPoint>,
}
