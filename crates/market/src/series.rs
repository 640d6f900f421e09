use crate::buffer::RollingBuffer;
use crate::session::EXCHANGE_TZ;
use chrono::{DateTime, Utc};
use kairos_core::market::entity::{Bar, PriceSeriesPoint};

/// # Summary
/// 单次写入对序列造成的影响。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesChange {
    // 最后一个点仍在当前时间桶内，被原地更新
    Updated,
    // 新开一个时间桶，`evicted` 表示是否挤出了最旧的点
    Appended { evicted: bool },
    // 报价时间早于最后一个点所在的桶，丢弃
    Ignored,
}

/// # Summary
/// 实时图表使用的分桶价格序列。
///
/// # Invariants
/// - 点按时间桶起点升序排列，同一个桶最多一个点。
/// - 仅最后一个点可被原地更新。
/// - 实时模式下长度不超过 `live_capacity`，超出时淘汰最旧的点。
/// - 历史区间播种不受该上限约束，完整保留后端返回的 K 线。
#[derive(Debug, Clone)]
pub struct LiveSeries {
    // 价格点环形缓冲区
    points: RollingBuffer<PriceSeriesPoint>,
    // 实时模式下的最大点数
    live_capacity: usize,
    // 时间桶宽度 (秒)
    bucket_secs: i64,
}

impl LiveSeries {
    /// # Summary
    /// 创建空序列。
    ///
    /// # Arguments
    /// * `capacity`: 实时模式下的最大点数。
    /// * `bucket_secs`: 时间桶宽度，至少 1 秒。
    pub fn new(capacity: usize, bucket_secs: i64) -> Self {
        Self {
            points: RollingBuffer::new(capacity),
            live_capacity: capacity,
            bucket_secs: bucket_secs.max(1),
        }
    }

    /// 时刻所在时间桶的起点。
    pub fn bucket_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let secs = at.timestamp();
        let start = secs - secs.rem_euclid(self.bucket_secs);
        DateTime::from_timestamp(start, 0).unwrap_or(at)
    }

    /// # Summary
    /// 记录一笔最新成交价。
    ///
    /// # Logic
    /// 1. 计算 `at` 所在的时间桶。
    /// 2. 若最后一个点位于同一个桶，原地更新其 close/high/low。
    /// 3. 否则追加新点；写满时淘汰最旧的点。
    /// 4. 追加后若给定 `retain_from`，丢弃早于该时刻的点 (股票仅保留当日盘前开始之后的数据)，
    ///    新追加的点本身不会被丢弃。
    ///
    /// # Arguments
    /// * `price`: 最新成交价。
    /// * `at`: 报价时刻。
    /// * `retain_from`: 可选的保留下限。
    ///
    /// # Returns
    /// 本次写入造成的变化。
    pub fn record(
        &mut self,
        price: f64,
        at: DateTime<Utc>,
        retain_from: Option<DateTime<Utc>>,
    ) -> SeriesChange {
        let bucket = self.bucket_start(at);

        if let Some(last) = self.points.last_mut() {
            if last.timestamp == bucket {
                last.price = price;
                last.close = price;
                last.high = last.high.max(price);
                last.low = last.low.min(price);
                return SeriesChange::Updated;
            }
            if last.timestamp > bucket {
                return SeriesChange::Ignored;
            }
        }

        let evicted = self
            .points
            .push(PriceSeriesPoint {
                timestamp: bucket,
                time_label: time_label(bucket),
                price,
                open: price,
                high: price,
                low: price,
                close: price,
                volume: 0.0,
            })
            .is_some();

        // 新追加的点始终保留
        if let Some(from) = retain_from.map(|from| from.min(bucket)) {
            self.points.retain(|p| p.timestamp >= from);
        }
        SeriesChange::Appended { evicted }
    }

    /// # Summary
    /// 以后端返回的 K 线重新播种序列。
    ///
    /// # Logic
    /// 1. 按时间升序去重 K 线。
    /// 2. 重建缓冲区：实时模式使用固定上限，超出时仅保留最新的部分；
    ///    历史区间按 K 线数量扩容，完整保留。
    /// 3. 若给定 `retain_from`，丢弃早于该时刻的点。
    ///
    /// # Arguments
    /// * `bars`: 后端 K 线。
    /// * `retain_from`: 可选的保留下限。
    /// * `live`: 是否为实时模式。
    pub fn seed(&mut self, bars: &[Bar], retain_from: Option<DateTime<Utc>>, live: bool) {
        let mut ordered: Vec<&Bar> = bars.iter().collect();
        ordered.sort_by_key(|b| b.time);
        ordered.dedup_by_key(|b| b.time);

        let capacity = if live {
            self.live_capacity
        } else {
            self.live_capacity.max(ordered.len())
        };
        self.points = RollingBuffer::new(capacity);

        for bar in ordered {
            self.points.push(PriceSeriesPoint {
                timestamp: bar.time,
                time_label: time_label(bar.time),
                price: bar.close,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            });
        }

        if let Some(from) = retain_from {
            self.points.retain(|p| p.timestamp >= from);
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// 清空序列并恢复实时模式的容量上限
    pub fn clear(&mut self) {
        self.points = RollingBuffer::new(self.live_capacity);
    }

    pub fn last(&self) -> Option<&PriceSeriesPoint> {
        self.points.last()
    }

    /// 按时间升序的全部价格点
    pub fn points(&self) -> Vec<PriceSeriesPoint> {
        self.points.to_vec()
    }
}

// 交易所当地时间 HH:MM
fn time_label(at: DateTime<Utc>) -> String {
    at.with_timezone(&EXCHANGE_TZ).format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 10, h, m, s).unwrap()
    }

    #[test]
    fn test_same_bucket_updates_in_place() {
        let mut series = LiveSeries::new(200, 300);
        assert_eq!(
            series.record(100.0, t(14, 0, 10), None),
            SeriesChange::Appended { evicted: false }
        );
        assert_eq!(series.record(101.5, t(14, 3, 0), None), SeriesChange::Updated);
        assert_eq!(series.record(99.0, t(14, 4, 59), None), SeriesChange::Updated);
        assert_eq!(series.len(), 1);

        let point = series.last().unwrap();
        assert_eq!(point.timestamp, t(14, 0, 0));
        assert_eq!(point.open, 100.0);
        assert_eq!(point.high, 101.5);
        assert_eq!(point.low, 99.0);
        assert_eq!(point.close, 99.0);
        assert_eq!(point.price, 99.0);
        // 14:00 UTC = 10:00 EDT
        assert_eq!(point.time_label, "10:00");
    }

    #[test]
    fn test_new_bucket_grows_by_one() {
        let mut series = LiveSeries::new(200, 300);
        series.record(100.0, t(14, 0, 0), None);
        series.record(100.2, t(14, 5, 0), None);
        assert_eq!(series.len(), 2);
        let timestamps: Vec<_> = series.points().iter().map(|p| p.timestamp).collect();
        assert_eq!(timestamps, vec![t(14, 0, 0), t(14, 5, 0)]);
    }

    #[test]
    fn test_cap_evicts_oldest() {
        let mut series = LiveSeries::new(200, 300);
        let start = t(0, 0, 0);
        for i in 0..200 {
            series.record(100.0, start + Duration::minutes(5 * i), None);
        }
        assert_eq!(series.len(), 200);

        let change = series.record(101.0, start + Duration::minutes(5 * 200), None);
        assert_eq!(change, SeriesChange::Appended { evicted: true });
        assert_eq!(series.len(), 200);
        let points = series.points();
        assert_eq!(points[0].timestamp, start + Duration::minutes(5));
        assert_eq!(points[199].close, 101.0);
    }

    #[test]
    fn test_stale_ticks_are_ignored() {
        let mut series = LiveSeries::new(10, 300);
        series.record(100.0, t(14, 10, 0), None);
        assert_eq!(series.record(90.0, t(14, 4, 0), None), SeriesChange::Ignored);
        assert_eq!(series.len(), 1);
        assert_eq!(series.last().unwrap().close, 100.0);
    }

    #[test]
    fn test_append_drops_prior_day_points() {
        let mut series = LiveSeries::new(200, 300);
        let yesterday = Utc.with_ymd_and_hms(2024, 7, 9, 23, 0, 0).unwrap();
        series.record(98.0, yesterday, None);
        series.record(98.5, yesterday + Duration::minutes(5), None);
        assert_eq!(series.len(), 2);

        // 当日盘前开始 04:00 EDT = 08:00 UTC
        let day_start = t(8, 0, 0);
        series.record(100.0, t(8, 2, 0), Some(day_start));
        assert_eq!(series.len(), 1);
        assert_eq!(series.last().unwrap().timestamp, day_start);
    }

    #[test]
    fn test_seed_orders_and_filters_bars() {
        let bar = |time, close| Bar {
            time,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
        };
        let mut series = LiveSeries::new(3, 300);
        series.record(1.0, t(1, 0, 0), None);

        let bars = vec![
            bar(t(14, 10, 0), 3.0),
            bar(t(14, 0, 0), 1.0),
            bar(t(14, 5, 0), 2.0),
            bar(t(14, 5, 0), 2.0),
            bar(t(14, 15, 0), 4.0),
        ];
        series.seed(&bars, None, true);
        let closes: Vec<_> = series.points().iter().map(|p| p.close).collect();
        assert_eq!(closes, vec![2.0, 3.0, 4.0]);

        series.seed(&bars, Some(t(14, 10, 0)), true);
        let closes: Vec<_> = series.points().iter().map(|p| p.close).collect();
        assert_eq!(closes, vec![3.0, 4.0]);

        // 播种后的实时报价落入最后一根 K 线所在的桶
        assert_eq!(series.record(4.5, t(14, 17, 0), None), SeriesChange::Updated);
        assert_eq!(series.last().unwrap().high, 5.0);
    }

    #[test]
    fn test_history_seed_is_not_capped() {
        let start = t(0, 0, 0);
        let bars: Vec<Bar> = (0..252)
            .map(|i| Bar {
                time: start + Duration::days(i),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 0.0,
            })
            .collect();

        let mut series = LiveSeries::new(200, 300);
        series.seed(&bars, None, false);
        assert_eq!(series.len(), 252);
        assert_eq!(series.points()[0].timestamp, start);

        // 回到实时模式后重新受上限约束
        series.seed(&bars, None, true);
        assert_eq!(series.len(), 200);
        assert_eq!(series.points()[0].timestamp, start + Duration::days(52));
    }

    #[test]
    fn test_unaligned_retain_keeps_appended_point() {
        let mut series = LiveSeries::new(200, 300);
        series.record(99.0, t(7, 55, 0), None);
        // 盘前开始 04:02 EDT，首笔报价落入 04:00 桶
        let change = series.record(100.0, t(8, 3, 0), Some(t(8, 2, 0)));
        assert_eq!(change, SeriesChange::Appended { evicted: false });
        assert_eq!(series.len(), 1);
        assert_eq!(series.last().unwrap().timestamp, t(8, 0, 0));
    }
}
