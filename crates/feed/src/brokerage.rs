use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kairos_core::common::{Instrument, TimeFrame};
use kairos_core::config::FeedConfig;
use kairos_core::market::entity::{Bar, MarketCalendarSnapshot, MarketHoursConfig, MarketHoursText};
use kairos_core::market::error::MarketError;
use kairos_core::market::port::MarketDataProvider;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

const CLIENT_AGENT: &str = concat!("kairos/", env!("CARGO_PKG_VERSION"));

/// # Summary
/// 券商代理行情提供者实现。
///
/// # Invariants
/// - 使用 `reqwest` 异步客户端进行通讯，所有请求共享同一个连接池。
/// - 不做重试；超时、非 2xx、无法解析的响应都原样映射为 `MarketError`。
#[derive(Clone)]
pub struct BrokerageProxyProvider {
    // 内部使用的 HTTP 客户端
    client: Client,
    // 代理根地址，不带结尾斜杠
    base_url: String,
}

impl BrokerageProxyProvider {
    /// # Summary
    /// 创建一个新的 BrokerageProxyProvider 实例。
    ///
    /// # Logic
    /// 1. 按配置设置请求超时。
    /// 2. 设置 User-Agent。
    /// 3. 初始化 reqwest 客户端。
    ///
    /// # Arguments
    /// * `config`: 数据源配置。
    ///
    /// # Returns
    /// 成功返回实例；TLS 后端不可用等导致客户端构建失败时返回 `MarketError::Unknown`。
    pub fn new(config: &FeedConfig) -> Result<Self, MarketError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_AGENT));

        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| MarketError::Unknown(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// # Summary
    /// 发起 GET 请求并将响应体解析为指定类型。
    ///
    /// # Logic
    /// 1. 拼接 `{base}/{endpoint}` 并附加查询参数。
    /// 2. 请求超时映射为 `Timeout`，其余传输错误为 `Network`。
    /// 3. 非 2xx 状态码映射为 `Network`。
    /// 4. 响应体无法解析映射为 `Parse`。
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T, MarketError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!("GET {} {:?}", url, query);

        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| transport_error(endpoint, &e))?;

        if !resp.status().is_success() {
            return Err(MarketError::Network(format!(
                "HTTP {} from {}",
                resp.status(),
                endpoint
            )));
        }

        resp.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                MarketError::Timeout(endpoint.to_string())
            } else {
                MarketError::Parse(format!("{}: {}", endpoint, e))
            }
        })
    }
}

fn transport_error(endpoint: &str, e: &reqwest::Error) -> MarketError {
    if e.is_timeout() {
        MarketError::Timeout(endpoint.to_string())
    } else {
        MarketError::Network(format!("{}: {}", endpoint, e))
    }
}

/// `latest-price` 响应体。
#[derive(Deserialize, Debug)]
struct LatestPriceBody {
    #[serde(default)]
    price: Option<f64>,
}

/// `bars` 响应体，缺失时视为空列表。
#[derive(Deserialize, Debug)]
struct BarsBody {
    #[serde(default)]
    bars: Vec<WireBar>,
}

/// # Summary
/// 代理返回的单根 K 线。
///
/// # Invariants
/// - 价格字段任一缺失的 K 线会被跳过；成交量缺失按 0 处理。
#[derive(Deserialize, Debug)]
struct WireBar {
    t: DateTime<Utc>,
    o: Option<f64>,
    h: Option<f64>,
    l: Option<f64>,
    c: Option<f64>,
    #[serde(default)]
    v: Option<f64>,
}

impl WireBar {
    fn into_bar(self) -> Option<Bar> {
        Some(Bar {
            time: self.t,
            open: self.o?,
            high: self.h?,
            low: self.l?,
            close: self.c?,
            volume: self.v.unwrap_or_default(),
        })
    }
}

/// `market-clock` 响应体。
#[derive(Deserialize, Debug)]
struct ClockBody {
    #[serde(default)]
    is_open: bool,
    #[serde(default)]
    next_open: Option<DateTime<Utc>>,
    #[serde(default)]
    next_close: Option<DateTime<Utc>>,
}

impl From<ClockBody> for MarketCalendarSnapshot {
    fn from(body: ClockBody) -> Self {
        Self {
            is_open: body.is_open,
            next_open: body.next_open,
            next_close: body.next_close,
        }
    }
}

#[async_trait]
impl MarketDataProvider for BrokerageProxyProvider {
    /// # Summary
    /// 获取最新成交价。
    ///
    /// # Logic
    /// 1. 请求 `latest-price?symbol=&asset_type=`。
    /// 2. `price` 缺失或为 null 时返回 `NotFound`。
    async fn latest_price(&self, instrument: &Instrument) -> Result<f64, MarketError> {
        let body: LatestPriceBody = self
            .get_json(
                "latest-price",
                &[
                    ("symbol", instrument.symbol.as_str()),
                    ("asset_type", instrument.asset_class.as_str()),
                ],
            )
            .await?;

        body.price
            .ok_or_else(|| MarketError::NotFound(format!("latest price for {}", instrument.symbol)))
    }

    /// # Summary
    /// 获取回看区间内的 K 线。
    ///
    /// # Logic
    /// 1. 请求 `bars?symbol=&asset_type=&period=&timeframe=`。
    /// 2. 丢弃价格字段不完整的 K 线，并按时间升序排列。
    async fn bars(
        &self,
        instrument: &Instrument,
        period: &str,
        timeframe: TimeFrame,
    ) -> Result<Vec<Bar>, MarketError> {
        let timeframe = timeframe.to_string();
        let body: BarsBody = self
            .get_json(
                "bars",
                &[
                    ("symbol", instrument.symbol.as_str()),
                    ("asset_type", instrument.asset_class.as_str()),
                    ("period", period),
                    ("timeframe", timeframe.as_str()),
                ],
            )
            .await?;

        let mut bars: Vec<Bar> = body.bars.into_iter().filter_map(WireBar::into_bar).collect();
        bars.sort_by_key(|b| b.time);
        Ok(bars)
    }

    async fn market_clock(&self) -> Result<MarketCalendarSnapshot, MarketError> {
        let body: ClockBody = self.get_json("market-clock", &[]).await?;
        Ok(body.into())
    }

    /// # Summary
    /// 获取交易时段边界。
    ///
    /// # Logic
    /// 缺失的边界使用默认值；任一边界格式非法时整体回退为默认配置。
    async fn market_hours(&self) -> Result<MarketHoursConfig, MarketError> {
        let text: MarketHoursText = self.get_json("market-hours", &[]).await?;
        Ok(MarketHoursConfig::from_text(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_wire_bars_are_skipped() {
        let body: BarsBody = serde_json::from_str(
            r#"{"bars":[
                {"t":"2024-07-10T14:00:00Z","o":1.0,"h":2.0,"l":0.5,"c":1.5,"v":100},
                {"t":"2024-07-10T14:05:00Z","o":1.5,"h":2.0,"l":1.0},
                {"t":"2024-07-10T14:10:00Z","o":1.5,"h":2.5,"l":1.0,"c":2.0}
            ]}"#,
        )
        .unwrap();
        let bars: Vec<Bar> = body.bars.into_iter().filter_map(WireBar::into_bar).collect();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].volume, 100.0);
        assert_eq!(bars[1].volume, 0.0);
        assert_eq!(bars[1].close, 2.0);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let bars: BarsBody = serde_json::from_str("{}").unwrap();
        assert!(bars.bars.is_empty());

        let clock: ClockBody = serde_json::from_str(r#"{"is_open":true}"#).unwrap();
        let snapshot = MarketCalendarSnapshot::from(clock);
        assert!(snapshot.is_open);
        assert_eq!(snapshot.next_open, None);

        let price: LatestPriceBody = serde_json::from_str(r#"{"price":null}"#).unwrap();
        assert_eq!(price.price, None);
    }
}
