use std::time::Duration;

use crate::ScheduleSettings;

// beyond this many doublings the cap is always reached
const MAX_BACKOFF_DOUBLINGS: u32 = 16;

/// Decides how long the loop waits before the next sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopScheduler {
    churn_threshold: usize,
    steady_interval: Duration,
    error_backoff: Duration,
    max_error_backoff: Duration,
}

impl LoopScheduler {
    pub fn new(
        churn_threshold: usize,
        steady_interval: Duration,
        error_backoff: Duration,
        max_error_backoff: Duration,
    ) -> Self {
        Self {
            churn_threshold,
            steady_interval,
            error_backoff,
            max_error_backoff,
        }
    }

    pub fn from_settings(settings: &ScheduleSettings) -> Self {
        Self::new(
            settings.churn_threshold,
            settings.steady_interval(),
            settings.error_backoff(),
            settings.max_error_backoff(),
        )
    }

    /// Delay after a completed sweep. A small registry is assumed settled
    /// and polled slowly; a large one means onboarding is under way and
    /// the next sweep starts right away.
    pub fn after_sweep(&self, node_count: usize) -> Option<Duration> {
        (node_count < self.churn_threshold).then_some(self.steady_interval)
    }

    /// Delay after the `consecutive_failures`-th failed sweep in a row.
    /// Fixed unless the cap is above the base backoff, in which case the
    /// delay doubles per failure up to the cap.
    pub fn after_failure(&self, consecutive_failures: u32) -> Duration {
        if self.max_error_backoff <= self.error_backoff {
            return self.error_backoff;
        }
        let doublings = consecutive_failures
            .saturating_sub(1)
            .min(MAX_BACKOFF_DOUBLINGS);
        self.error_backoff
            .saturating_mul(1 << doublings)
            .min(self.max_error_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(max_backoff_secs: u64) -> LoopScheduler {
        LoopScheduler::new(
            10,
            Duration::from_secs(1800),
            Duration::from_secs(10),
            Duration::from_secs(max_backoff_secs),
        )
    }

    #[test]
    fn test_churn_mode_has_no_delay() {
        assert_eq!(scheduler(10).after_sweep(15), None);
        assert_eq!(scheduler(10).after_sweep(10), None);
    }

    #[test]
    fn test_steady_state_waits_long_interval() {
        assert_eq!(
            scheduler(10).after_sweep(3),
            Some(Duration::from_secs(1800))
        );
        assert_eq!(
            scheduler(10).after_sweep(0),
            Some(Duration::from_secs(1800))
        );
    }

    #[test]
    fn test_fixed_backoff_by_default() {
        let scheduler = scheduler(10);
        for failures in [1, 2, 10, u32::MAX] {
            assert_eq!(scheduler.after_failure(failures), Duration::from_secs(10));
        }
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let scheduler = scheduler(60);
        assert_eq!(scheduler.after_failure(1), Duration::from_secs(10));
        assert_eq!(scheduler.after_failure(2), Duration::from_secs(20));
        assert_eq!(scheduler.after_failure(3), Duration::from_secs(40));
        assert_eq!(scheduler.after_failure(4), Duration::from_secs(60));
        assert_eq!(scheduler.after_failure(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_from_settings() {
        let scheduler = LoopScheduler::from_settings(&ScheduleSettings::default());
        assert_eq!(scheduler.after_sweep(9), Some(Duration::from_secs(1800)));
        assert_eq!(scheduler.after_failure(3), Duration::from_secs(10));
    }
}
