//! Poll interval backoff.

use std::time::Duration;

/// Default polling interval, the integration's scan interval.
pub const DEFAULT_BASE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default ceiling for the backed-off interval.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Exponential backoff with a cap.
///
/// `interval(n) = min(base * 2^n, max)` where `n` is the number of
/// consecutive failed cycles. Zero failures gives the base interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
}

impl BackoffPolicy {
    /// Create a policy. A `max` below `base` is raised to `base`.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay before the next cycle after `failures` consecutive failures.
    pub fn interval(&self, failures: u32) -> Duration {
        2u32.checked_pow(failures)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_INTERVAL, DEFAULT_MAX_INTERVAL)
    }
}
