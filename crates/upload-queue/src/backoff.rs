//! Exponential backoff between transient upload failures.

use std::time::Duration;

use clipveil_common::config::UploadDefaults;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Upper bound on any delay.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    pub fn from_defaults(defaults: &UploadDefaults) -> Self {
        Self {
            initial_delay: Duration::from_millis(defaults.backoff_initial_ms),
            max_delay: Duration::from_millis(defaults.backoff_max_ms),
            multiplier: defaults.backoff_multiplier.max(1.0),
        }
    }

    /// Delay before the next attempt after `retry_count` failures:
    /// `min(initial × multiplier^(retry_count - 1), max)`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        if retry_count == 0 {
            return Duration::ZERO;
        }
        let exp = (retry_count - 1).min(63) as i32;
        let ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exp);
        let max_ms = self.max_delay.as_millis() as f64;
        if !ms.is_finite() || ms >= max_ms {
            return self.max_delay;
        }
        Duration::from_millis(ms as u64)
    }
}
