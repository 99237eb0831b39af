//! Retry ceiling and exponential backoff

use std::time::Duration;

/// Retry policy applied by [`crate::QueueStore::fail`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failures after which a task is dropped
    pub max_retries: u32,
    /// Delay after the zeroth failure; doubles per recorded failure
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: crate::DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_secs(crate::DEFAULT_BACKOFF_BASE_SECS),
        }
    }
}

impl RetryPolicy {
    /// Delay before a task that has failed `retries` times becomes claimable again
    pub fn delay_for(&self, retries: u32) -> Duration {
        backoff_delay(self.base_delay, retries)
    }

    /// Whether a task that has now failed `retries` times should be dropped
    pub fn exhausted(&self, retries: u32) -> bool {
        retries >= self.max_retries
    }
}

/// `2^retries × base`, saturating at `Duration::MAX`
pub fn backoff_delay(base: Duration, retries: u32) -> Duration {
    match 2u32.checked_pow(retries) {
        Some(factor) => base.checked_mul(factor).unwrap_or(Duration::MAX),
        None if base.is_zero() => Duration::ZERO,
        None => Duration::MAX,
    }
}
