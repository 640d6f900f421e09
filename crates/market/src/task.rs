use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

// 周期为 0 时 tokio 的 interval 会 panic
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// # Summary
/// 周期任务首次触发的时机。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstTick {
    // 创建后立即触发
    Immediate,
    // 等待一个完整周期后触发
    AfterPeriod,
}

/// # Summary
/// 定时任务句柄，持有后台协程的独占所有权。
///
/// # Invariants
/// - 句柄被 drop 时立即中止后台协程，定时器的释放与句柄生命周期严格绑定。
/// - 周期任务按固定节拍运行，失败不退避；任务自身返回 `Break` 时结束。
pub struct ScheduledTask {
    // 任务名称，仅用于日志
    name: &'static str,
    // 后台协程句柄
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// # Summary
    /// 启动一个固定周期的任务。
    ///
    /// # Logic
    /// 1. 按 `first` 决定首次触发时间，之后每隔 `period` 触发一次。
    /// 2. 错过的节拍顺延而非补发。
    /// 3. `job` 返回 `ControlFlow::Break` 时退出循环。
    ///
    /// # Arguments
    /// * `name`: 任务名称。
    /// * `period`: 触发周期。
    /// * `first`: 首次触发时机。
    /// * `job`: 每次触发时执行的异步任务工厂。
    ///
    /// # Returns
    /// 任务句柄。
    pub fn every<F, Fut>(name: &'static str, period: Duration, first: FirstTick, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let period = period.max(MIN_PERIOD);
        let handle = tokio::spawn(async move {
            let start = match first {
                FirstTick::Immediate => Instant::now(),
                FirstTick::AfterPeriod => Instant::now() + period,
            };
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                if job().await.is_break() {
                    debug!("Scheduled task {} finished", name);
                    break;
                }
            }
        });
        Self { name, handle }
    }

    /// # Summary
    /// 启动一个延迟执行一次的任务。
    ///
    /// # Arguments
    /// * `name`: 任务名称。
    /// * `delay`: 延迟时长。
    /// * `job`: 延迟结束后执行的异步任务。
    ///
    /// # Returns
    /// 任务句柄。
    pub fn after<Fut>(name: &'static str, delay: Duration, job: Fut) -> Self
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            job.await;
        });
        Self { name, handle }
    }

}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        debug!("Scheduled task {} released", self.name);
        self.handle.abort();
    }
}
