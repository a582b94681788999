use std::ops::RangeInclusive;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::domain::Task;
use crate::error::HandlerError;

/// The work behind a task.
///
/// The dispatcher only looks at success vs failure. A handler is never
/// interrupted once started, including during shutdown. A panic inside
/// `handle` is caught by the worker and counts as a failed attempt.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> Result<(), HandlerError>;
}

/// Placeholder work: sleeps a random duration, then fails with a fixed probability.
#[derive(Debug, Clone)]
pub struct SimulatedHandler {
    duration: RangeInclusive<Duration>,
    failure_rate: f64,
}

impl SimulatedHandler {
    /// `failure_rate` is clamped into `0.0..=1.0` (NaN counts as 0).
    pub fn new(duration: RangeInclusive<Duration>, failure_rate: f64) -> Self {
        let failure_rate = if failure_rate.is_nan() {
            0.0
        } else {
            failure_rate.clamp(0.0, 1.0)
        };
        Self {
            duration,
            failure_rate,
        }
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }
}

impl Default for SimulatedHandler {
    /// 100–500ms per task, 20% failures.
    fn default() -> Self {
        Self::new(Duration::from_millis(100)..=Duration::from_millis(500), 0.2)
    }
}

#[async_trait]
impl TaskHandler for SimulatedHandler {
    async fn handle(&self, task: &Task) -> Result<(), HandlerError> {
        // ThreadRng は Send ではないので await の前に使い切る
        let (work, fail) = {
            let mut rng = rand::thread_rng();
            let (lo, hi) = (*self.duration.start(), *self.duration.end());
            let work = if lo >= hi { lo } else { rng.gen_range(lo..=hi) };
            (work, rng.gen_bool(self.failure_rate))
        };

        tokio::time::sleep(work).await;

        if fail {
            return Err(HandlerError::new(task.id.clone(), "simulated failure"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn never_failing_simulation_succeeds() {
        let duration = Duration::from_millis(10)..=Duration::from_millis(20);
        let handler = SimulatedHandler::new(duration, 0.0);
        let task = Task::new("ok", "", 0);

        let started = tokio::time::Instant::now();
        for _ in 0..20 {
            handler.handle(&task).await.unwrap();
        }
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed <= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_simulation_reports_task_id() {
        let handler = SimulatedHandler::new(Duration::ZERO..=Duration::ZERO, 1.0);
        let err = handler.handle(&Task::new("boom", "", 0)).await.unwrap_err();
        assert_eq!(err.task_id.as_str(), "boom");
        assert!(err.to_string().contains("simulated failure"));
    }

    #[test]
    fn failure_rate_is_clamped() {
        let instant = || Duration::ZERO..=Duration::ZERO;
        assert_eq!(SimulatedHandler::new(instant(), 3.0).failure_rate(), 1.0);
        assert_eq!(SimulatedHandler::new(instant(), -1.0).failure_rate(), 0.0);
        assert_eq!(SimulatedHandler::new(instant(), f64::NAN).failure_rate(), 0.0);
    }
}
