//! 供测试使用的脚本化行情数据源。

use crate::common::{Instrument, TimeFrame};
use crate::market::entity::{Bar, MarketCalendarSnapshot, MarketHoursConfig};
use crate::market::error::MarketError;
use crate::market::port::MarketDataProvider;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// # Summary
/// 按脚本返回预设结果的行情数据源。
///
/// # Invariants
/// - 报价队列耗尽后重复返回最后一次成功的报价；从未成功过则返回 NotFound。
/// - 所有调用都会被计数，便于断言定时器的触发次数。
pub struct ScriptedProvider {
    prices: Mutex<VecDeque<Result<f64, MarketError>>>,
    last_price: Mutex<Option<f64>>,
    bars: Mutex<Vec<Bar>>,
    clock: Mutex<Result<MarketCalendarSnapshot, MarketError>>,
    hours: Mutex<Result<MarketHoursConfig, MarketError>>,
    bar_requests: Mutex<Vec<(String, String, TimeFrame)>>,
    price_calls: AtomicUsize,
    clock_calls: AtomicUsize,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProvider {
    /// 创建空脚本：无报价、无 K 线、日历请求失败、时段为默认值。
    pub fn new() -> Self {
        Self {
            prices: Mutex::new(VecDeque::new()),
            last_price: Mutex::new(None),
            bars: Mutex::new(Vec::new()),
            clock: Mutex::new(Err(MarketError::NotFound("market clock".into()))),
            hours: Mutex::new(Ok(MarketHoursConfig::default())),
            bar_requests: Mutex::new(Vec::new()),
            price_calls: AtomicUsize::new(0),
            clock_calls: AtomicUsize::new(0),
        }
    }

    /// 追加一个成功报价
    pub fn push_price(&self, price: f64) {
        lock(&self.prices).push_back(Ok(price));
    }

    /// 追加一次报价失败
    pub fn push_price_error(&self, err: MarketError) {
        lock(&self.prices).push_back(Err(err));
    }

    pub fn set_bars(&self, bars: Vec<Bar>) {
        *lock(&self.bars) = bars;
    }

    pub fn set_clock(&self, clock: Result<MarketCalendarSnapshot, MarketError>) {
        *lock(&self.clock) = clock;
    }

    pub fn set_hours(&self, hours: Result<MarketHoursConfig, MarketError>) {
        *lock(&self.hours) = hours;
    }

    /// 报价接口被调用的次数
    pub fn price_calls(&self) -> usize {
        self.price_calls.load(Ordering::SeqCst)
    }

    /// 日历接口被调用的次数
    pub fn clock_calls(&self) -> usize {
        self.clock_calls.load(Ordering::SeqCst)
    }

    /// 已收到的 K 线请求 `(symbol, period, timeframe)`
    pub fn bar_requests(&self) -> Vec<(String, String, TimeFrame)> {
        lock(&self.bar_requests).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl MarketDataProvider for ScriptedProvider {
    async fn latest_price(&self, _instrument: &Instrument) -> Result<f64, MarketError> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.prices).pop_front() {
            Some(Ok(price)) => {
                *lock(&self.last_price) = Some(price);
                Ok(price)
            }
            Some(Err(e)) => Err(e),
            None => (*lock(&self.last_price))
                .ok_or_else(|| MarketError::NotFound("latest price".into())),
        }
    }

    async fn bars(
        &self,
        instrument: &Instrument,
        period: &str,
        timeframe: TimeFrame,
    ) -> Result<Vec<Bar>, MarketError> {
        lock(&self.bar_requests).push((instrument.symbol.clone(), period.to_string(), timeframe));
        Ok(lock(&self.bars).clone())
    }

    async fn market_clock(&self) -> Result<MarketCalendarSnapshot, MarketError> {
        self.clock_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.clock).clone()
    }

    async fn market_hours(&self) -> Result<MarketHoursConfig, MarketError> {
        lock(&self.hours).clone()
    }
}
