use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Timelike, Utc};
use chrono_tz::{OffsetComponents, Tz};
use kairos_core::common::time::TimeProvider;
use kairos_core::market::entity::{
    MarketCalendarSnapshot, MarketHoursConfig, SessionBoundaries, SessionState, SessionTime,
    TradingSession,
};
use std::sync::Arc;

/// 参考交易所所在时区 (美东时间，含夏令时规则)。
pub const EXCHANGE_TZ: Tz = chrono_tz::America::New_York;

// 无日历快照时，观察者时区下粗略对应常规交易时段的小时区间 [14, 21)
const VIEWER_OPEN_HOURS: std::ops::Range<u32> = 14..21;

const MINUTES_PER_DAY: i64 = 24 * 60;

/// # Summary
/// 交易时段解析器：根据当前时间、时段配置与可选的日历快照计算交易时段。
///
/// # Invariants
/// - 解析过程为纯计算，不会失败，也不做任何 IO。
/// - 当前时间只通过注入的 `TimeProvider` 获取。
pub struct MarketSessionResolver {
    // 观察者时区 (固定偏移)
    viewer_zone: FixedOffset,
    // 时间供给器
    clock: Arc<dyn TimeProvider>,
}

impl MarketSessionResolver {
    /// # Summary
    /// 创建解析器。
    ///
    /// # Logic
    /// 1. 将小时偏移换算为固定时区，越界时退回 UTC。
    ///
    /// # Arguments
    /// * `viewer_utc_offset_hours`: 观察者时区相对 UTC 的小时偏移。
    /// * `clock`: 时间供给器。
    ///
    /// # Returns
    /// 解析器实例。
    pub fn new(viewer_utc_offset_hours: i32, clock: Arc<dyn TimeProvider>) -> Self {
        let viewer_zone = viewer_utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| {
                tracing::warn!(
                    "Viewer offset {}h out of range, using UTC",
                    viewer_utc_offset_hours
                );
                Utc.fix()
            });
        Self { viewer_zone, clock }
    }

    pub fn clock(&self) -> &Arc<dyn TimeProvider> {
        &self.clock
    }

    /// 以注入时钟的当前时间解析交易时段。
    pub fn resolve(
        &self,
        hours: &MarketHoursConfig,
        snapshot: Option<&MarketCalendarSnapshot>,
    ) -> SessionState {
        self.resolve_at(self.clock.now(), hours, snapshot)
    }

    /// # Summary
    /// 解析指定时刻的交易时段。
    ///
    /// # Logic
    /// 1. 将时刻转换为交易所当地的当日分钟数。
    /// 2. 按 盘前 -> 盘中 -> 盘后 的优先级匹配左闭右开窗口，均不命中则为休市。
    /// 3. 存在日历快照时与边界结果合并：
    ///    - 快照休市且边界休市：休市。
    ///    - 快照休市但边界命中时段：以边界为准并视为开市 (盘前盘后快照可能为休市)。
    ///    - 快照开市但边界休市：按边界窗口重新计算并视为开市。
    ///    - 二者都为开放时段：沿用边界结果。
    /// 4. 无快照时，时段仍由边界决定；开市标记在边界命中时为真，否则退化为观察者时区
    ///    [14, 21) 点的粗略判断。
    /// 5. 生成交易所时区与观察者时区下的六个边界字符串。
    ///
    /// # Arguments
    /// * `now`: 待解析的时刻。
    /// * `hours`: 时段边界配置。
    /// * `snapshot`: 可选的交易日历快照。
    ///
    /// # Returns
    /// 会话解析结果。
    pub fn resolve_at(
        &self,
        now: DateTime<Utc>,
        hours: &MarketHoursConfig,
        snapshot: Option<&MarketCalendarSnapshot>,
    ) -> SessionState {
        let local = now.with_timezone(&EXCHANGE_TZ);
        let minute = local.hour() * 60 + local.minute();
        let boundary = session_at(hours, minute);

        let (current_session, is_market_open) = match snapshot {
            Some(snap) => match (snap.is_open, boundary) {
                (false, TradingSession::Closed) => (TradingSession::Closed, false),
                (false, session) => (session, true),
                (true, TradingSession::Closed) => (session_at(hours, minute), true),
                (true, session) => (session, true),
            },
            None => (
                boundary,
                boundary.is_open() || self.viewer_heuristic_open(now),
            ),
        };

        let exchange_offset = local.offset().fix().local_minus_utc();
        let exchange_dst = !local.offset().dst_offset().is_zero();
        let shift_minutes = i64::from(self.viewer_zone.local_minus_utc() - exchange_offset) / 60;

        SessionState {
            current_session,
            is_market_open,
            exchange_dst,
            exchange: format_boundaries(hours, 0),
            viewer: format_boundaries(hours, shift_minutes),
            next_open: snapshot.and_then(|s| s.next_open),
            next_close: snapshot.and_then(|s| s.next_close),
        }
    }

    /// # Summary
    /// 计算 `now` 所在交易日的盘前开始时刻 (UTC)。
    ///
    /// # Logic
    /// 1. 取 `now` 在交易所时区下的日期，与盘前开始钟点组合后换回 UTC。
    /// 2. 若该时刻仍晚于 `now` (当日盘前尚未开始)，改用前一日的盘前开始时刻。
    /// 3. 落入夏令时跳变空档时返回 None。
    ///
    /// # Arguments
    /// * `now`: 参考时刻。
    /// * `hours`: 时段边界配置。
    ///
    /// # Returns
    /// 不晚于 `now` 的最近一次盘前开始时刻。
    pub fn trading_day_start(
        &self,
        now: DateTime<Utc>,
        hours: &MarketHoursConfig,
    ) -> Option<DateTime<Utc>> {
        let date = now.with_timezone(&EXCHANGE_TZ).date_naive();
        let start = NaiveTime::from_hms_opt(
            hours.pre_market_start.hour(),
            hours.pre_market_start.minute(),
            0,
        )?;
        let at = |day: NaiveDate| {
            EXCHANGE_TZ
                .from_local_datetime(&day.and_time(start))
                .earliest()
                .map(|t| t.with_timezone(&Utc))
        };

        match at(date)? {
            today if today <= now => Some(today),
            _ => at(date.pred_opt()?),
        }
    }

    fn viewer_heuristic_open(&self, now: DateTime<Utc>) -> bool {
        VIEWER_OPEN_HOURS.contains(&now.with_timezone(&self.viewer_zone).hour())
    }
}

/// # Summary
/// 按优先级匹配当日分钟数所在的交易时段。
///
/// # Logic
/// 1. 依次检查盘前、盘中、盘后窗口 `[start, end)`。
/// 2. 返回第一个命中的时段；都不命中则为休市。
///
/// # Arguments
/// * `hours`: 时段边界配置。
/// * `minute_of_day`: 交易所当地的当日分钟数。
///
/// # Returns
/// 命中的交易时段。
pub fn session_at(hours: &MarketHoursConfig, minute_of_day: u32) -> TradingSession {
    hours
        .windows()
        .iter()
        .find(|(_, start, end)| {
            start.minute_of_day() <= minute_of_day && minute_of_day < end.minute_of_day()
        })
        .map(|(session, _, _)| *session)
        .unwrap_or(TradingSession::Closed)
}

fn format_boundaries(hours: &MarketHoursConfig, shift_minutes: i64) -> SessionBoundaries {
    let fmt = |t: SessionTime| shift(t, shift_minutes).to_string();
    SessionBoundaries {
        pre_market_start: fmt(hours.pre_market_start),
        pre_market_end: fmt(hours.pre_market_end),
        regular_start: fmt(hours.regular_start),
        regular_end: fmt(hours.regular_end),
        after_market_start: fmt(hours.after_market_start),
        after_market_end: fmt(hours.after_market_end),
    }
}

// 跨日时按 24 小时回绕
fn shift(t: SessionTime, minutes: i64) -> SessionTime {
    let shifted = (i64::from(t.minute_of_day()) + minutes).rem_euclid(MINUTES_PER_DAY);
    SessionTime::from_minute_of_day(u32::try_from(shifted).unwrap_or(0))
}
