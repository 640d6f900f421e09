use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// # Summary
/// 某个代码最近一次已知的成交价。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookEntry {
    pub price: f64,
    pub updated_at: DateTime<Utc>,
}

/// # Summary
/// 最近成交价簿，由外部显式注入，供刷新器写入、其它视图读取。
///
/// # Invariants
/// - 基于 `DashMap`，多线程并发读写安全。
/// - 同一代码仅保留最后写入的价格 (last write wins)。
#[derive(Debug, Default)]
pub struct PriceBook {
    // Key 为交易代码
    prices: DashMap<String, BookEntry>,
}

impl PriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次成交价，覆盖旧值。
    pub fn record(&self, symbol: &str, price: f64, at: DateTime<Utc>) {
        self.prices.insert(
            symbol.to_string(),
            BookEntry {
                price,
                updated_at: at,
            },
        );
    }

    pub fn get(&self, symbol: &str) -> Option<BookEntry> {
        self.prices.get(symbol).map(|e| *e.value())
    }

    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.get(symbol).map(|e| e.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_last_write_wins() {
        let book = PriceBook::new();
        let t0 = Utc.with_ymd_and_hms(2024, 7, 10, 14, 0, 0).unwrap();
        book.record("AAPL", 190.0, t0);
        book.record("AAPL", 191.5, t0 + chrono::Duration::seconds(3));

        let entry = book.get("AAPL").unwrap();
        assert_eq!(entry.price, 191.5);
        assert_eq!(entry.updated_at, t0 + chrono::Duration::seconds(3));
        assert_eq!(book.price("MSFT"), None);
    }
}
