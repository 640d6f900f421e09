use crate::common::AssetClass;
use crate::market::entity::MarketHoursText;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub refresher: RefresherConfig,
    pub session: SessionConfig,
    pub watch: WatchConfig,
}

/// 券商代理接入配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    // 代理服务根地址，如 http://127.0.0.1:8080/api/brokerage
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/api/brokerage".to_string(),
            timeout_secs: 10,
        }
    }
}

impl FeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// # Summary
/// 实时刷新器的调度与序列参数。
///
/// # Invariants
/// - 所有周期均为固定值，失败后不退避。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefresherConfig {
    // 快速报价轮询周期
    pub quote_interval_secs: u64,
    // 实时模式下 K 线重拉周期
    pub bars_interval_secs: u64,
    // 交易日历刷新周期
    pub clock_interval_secs: u64,
    // 涨跌方向自动清除的延迟
    pub change_clear_secs: u64,
    // 价格序列最大长度
    pub series_capacity: usize,
    // 时间桶宽度
    pub bucket_secs: i64,
    // 判定涨跌的最小价差
    pub change_threshold: f64,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            quote_interval_secs: 3,
            bars_interval_secs: 300,
            clock_interval_secs: 60,
            change_clear_secs: 3,
            series_capacity: 200,
            bucket_secs: 300,
            change_threshold: 0.01,
        }
    }
}

impl RefresherConfig {
    pub fn quote_interval(&self) -> Duration {
        Duration::from_secs(self.quote_interval_secs)
    }

    pub fn bars_interval(&self) -> Duration {
        Duration::from_secs(self.bars_interval_secs)
    }

    pub fn clock_interval(&self) -> Duration {
        Duration::from_secs(self.clock_interval_secs)
    }

    pub fn change_clear_delay(&self) -> Duration {
        Duration::from_secs(self.change_clear_secs)
    }
}

/// 会话解析配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    // 观察者所在时区相对 UTC 的小时偏移
    pub viewer_utc_offset_hours: i32,
    // 在拿到 market-hours 响应之前使用的时段边界
    pub market_hours: MarketHoursText,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            viewer_utc_offset_hours: 3,
            market_hours: MarketHoursText::default(),
        }
    }
}

/// 启动时自动打开的标的
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub symbol: String,
    pub asset_class: AssetClass,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            symbol: "AAPL".to_string(),
            asset_class: AssetClass::Equity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.refresher.quote_interval(), Duration::from_secs(3));
        assert_eq!(config.refresher.bars_interval(), Duration::from_secs(300));
        assert_eq!(config.refresher.change_clear_delay(), Duration::from_secs(3));
        assert_eq!(config.refresher.series_capacity, 200);
        assert_eq!(config.refresher.bucket_secs, 300);
        assert_eq!(config.session.viewer_utc_offset_hours, 3);
        assert_eq!(config.watch.asset_class, AssetClass::Equity);
        assert_eq!(config.feed.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let json = r#"{ "refresher": { "quote_interval_secs": 5 }, "watch": { "symbol": "BTC/USD", "asset_class": "crypto" } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.refresher.quote_interval_secs, 5);
        assert_eq!(config.refresher.series_capacity, 200);
        assert_eq!(config.watch.asset_class, AssetClass::Crypto);
        assert_eq!(config.session.viewer_utc_offset_hours, 3);
    }
}
