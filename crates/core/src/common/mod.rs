pub mod time;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// # Summary
/// 交易标的实体，代表详情页当前关注的股票、加密货币或期权。
///
/// # Invariants
/// - `symbol` 必须是合法的交易代码。
/// - 同一 `symbol` 在不同资产类别下视为不同标的。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Instrument {
    // 交易代码 (例如: AAPL, BTC/USD)
    pub symbol: String,
    // 资产类别
    pub asset_class: AssetClass,
}

impl Instrument {
    /// # Summary
    /// 构造一个交易标的。
    ///
    /// # Arguments
    /// * `symbol`: 交易代码。
    /// * `asset_class`: 资产类别。
    ///
    /// # Returns
    /// 标的实体。
    pub fn new(symbol: impl Into<String>, asset_class: AssetClass) -> Self {
        Self {
            symbol: symbol.into(),
            asset_class,
        }
    }

    /// 是否为 7x24 小时交易的标的。
    pub fn trades_around_the_clock(&self) -> bool {
        self.asset_class == AssetClass::Crypto
    }
}

/// # Summary
/// 资产类别枚举。
///
/// # Invariants
/// - `Crypto` 全天候交易，不受交易所会话约束。
/// - `Equity` 与 `Option` 遵循交易所的盘前、盘中、盘后时段。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    // 股票
    Equity,
    // 加密货币
    Crypto,
    // 期权
    Option,
}

impl AssetClass {
    /// 券商代理接口使用的 `asset_type` 参数值。
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Equity => "stock",
            AssetClass::Crypto => "crypto",
            AssetClass::Option => "option",
        }
    }
}

impl FromStr for AssetClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stock" | "equity" | "us_equity" => Ok(AssetClass::Equity),
            "crypto" => Ok(AssetClass::Crypto),
            "option" | "options" => Ok(AssetClass::Option),
            _ => Err(format!("Unknown AssetClass: {}", s)),
        }
    }
}

impl std::fmt::Display for AssetClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// # Summary
/// K 线时间周期枚举，对应券商代理 `bars` 接口的 `timeframe` 参数。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TimeFrame {
    // 5分钟
    Minute5,
    // 1小时
    Hour1,
    // 1日
    Day1,
}

impl FromStr for TimeFrame {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "5min" | "5m" | "minute5" => Ok(TimeFrame::Minute5),
            "1hour" | "1h" | "hour1" => Ok(TimeFrame::Hour1),
            "1day" | "1d" | "day1" => Ok(TimeFrame::Day1),
            _ => Err(format!("Unknown TimeFrame: {}", s)),
        }
    }
}

impl std::fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeFrame::Minute5 => write!(f, "5Min"),
            TimeFrame::Hour1 => write!(f, "1Hour"),
            TimeFrame::Day1 => write!(f, "1Day"),
        }
    }
}

/// # Summary
/// 图表展示周期。`Live` 为盘中实时模式，其余为历史回看区间。
///
/// # Invariants
/// - 每个周期唯一对应一组 (`lookback`, `timeframe`) 后端请求参数。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum ChartPeriod {
    // 实时
    Live,
    // 1日
    Day1,
    // 1周 (默认回看区间)
    #[default]
    Week1,
    // 1个月
    Month1,
    // 3个月
    Month3,
    // 1年
    Year1,
}

impl ChartPeriod {
    /// 休市时自动切回的默认回看区间。
    pub const DEFAULT_LOOKBACK: ChartPeriod = ChartPeriod::Week1;

    pub fn is_live(&self) -> bool {
        *self == ChartPeriod::Live
    }

    /// 请求 `bars` 接口时使用的 `period` 参数。
    pub fn lookback(&self) -> &'static str {
        match self {
            ChartPeriod::Live | ChartPeriod::Day1 => "1D",
            ChartPeriod::Week1 => "1W",
            ChartPeriod::Month1 => "1M",
            ChartPeriod::Month3 => "3M",
            ChartPeriod::Year1 => "1A",
        }
    }

    /// 请求 `bars` 接口时使用的 K 线周期。
    pub fn timeframe(&self) -> TimeFrame {
        match self {
            ChartPeriod::Live | ChartPeriod::Day1 => TimeFrame::Minute5,
            ChartPeriod::Week1 => TimeFrame::Hour1,
            ChartPeriod::Month1 | ChartPeriod::Month3 | ChartPeriod::Year1 => TimeFrame::Day1,
        }
    }
}

impl FromStr for ChartPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "live" => Ok(ChartPeriod::Live),
            "1d" | "day1" => Ok(ChartPeriod::Day1),
            "1w" | "week1" => Ok(ChartPeriod::Week1),
            "1m" | "month1" => Ok(ChartPeriod::Month1),
            "3m" | "month3" => Ok(ChartPeriod::Month3),
            "1y" | "year1" => Ok(ChartPeriod::Year1),
            _ => Err(format!("Unknown ChartPeriod: {}", s)),
        }
    }
}

impl std::fmt::Display for ChartPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChartPeriod::Live => write!(f, "live"),
            ChartPeriod::Day1 => write!(f, "1d"),
            ChartPeriod::Week1 => write!(f, "1w"),
            ChartPeriod::Month1 => write!(f, "1m"),
            ChartPeriod::Month3 => write!(f, "3m"),
            ChartPeriod::Year1 => write!(f, "1y"),
        }
    }
}
