use kairos_core::market::entity::{ChangeDirection, LiveQuoteState};

/// # Summary
/// 跟踪当前标的的最新价与涨跌方向。
///
/// # Invariants
/// - 首个观测到的价格不会产生方向。
/// - 只有价差绝对值严格大于阈值时才设置方向。
/// - 方向的清除由外部定时器调用 `clear_direction` 完成。
#[derive(Debug, Clone)]
pub struct QuoteTracker {
    // 判定涨跌的最小价差
    threshold: f64,
    state: LiveQuoteState,
}

impl QuoteTracker {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            state: LiveQuoteState::default(),
        }
    }

    /// # Summary
    /// 记录一次新报价。
    ///
    /// # Logic
    /// 1. 将上一次的最新价移入 `previous_price`。
    /// 2. 与上一次最新价比较，超过阈值则设置涨跌方向。
    ///
    /// # Arguments
    /// * `price`: 新报价。
    ///
    /// # Returns
    /// 本次新设置的方向；未达到阈值或为首个报价时返回 None。
    pub fn observe(&mut self, price: f64) -> Option<ChangeDirection> {
        let last = self.state.last_price.replace(price);
        self.state.previous_price = last;

        let delta = price - last?;
        let direction = if delta > self.threshold {
            ChangeDirection::Up
        } else if delta < -self.threshold {
            ChangeDirection::Down
        } else {
            return None;
        };
        self.state.change_direction = Some(direction);
        Some(direction)
    }

    /// 清除涨跌方向，返回清除前的值。
    pub fn clear_direction(&mut self) -> Option<ChangeDirection> {
        self.state.change_direction.take()
    }

    /// 切换标的时重置全部瞬态数据
    pub fn reset(&mut self) {
        self.state = LiveQuoteState::default();
    }

    pub fn state(&self) -> LiveQuoteState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_price_has_no_direction() {
        let mut tracker = QuoteTracker::new(0.01);
        assert_eq!(tracker.observe(100.0), None);
        assert_eq!(tracker.state().change_direction, None);
        assert_eq!(tracker.state().last_price, Some(100.0));
        assert_eq!(tracker.state().previous_price, None);
    }

    #[test]
    fn test_direction_requires_more_than_threshold() {
        let mut tracker = QuoteTracker::new(0.01);
        tracker.observe(100.0);
        assert_eq!(tracker.observe(100.005), None);
        assert_eq!(tracker.observe(100.02), Some(ChangeDirection::Up));
        assert_eq!(tracker.state().previous_price, Some(100.005));
        assert_eq!(tracker.observe(99.9), Some(ChangeDirection::Down));
        assert_eq!(tracker.state().change_direction, Some(ChangeDirection::Down));
    }

    #[test]
    fn test_small_move_keeps_existing_direction_until_cleared() {
        let mut tracker = QuoteTracker::new(0.01);
        tracker.observe(10.0);
        tracker.observe(10.5);
        assert_eq!(tracker.observe(10.501), None);
        assert_eq!(tracker.state().change_direction, Some(ChangeDirection::Up));
        assert_eq!(tracker.clear_direction(), Some(ChangeDirection::Up));
        assert_eq!(tracker.state().change_direction, None);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut tracker = QuoteTracker::new(0.01);
        tracker.observe(1.0);
        tracker.observe(2.0);
        tracker.reset();
        assert_eq!(tracker.state(), LiveQuoteState::default());
        assert_eq!(tracker.observe(3.0), None);
    }
}
