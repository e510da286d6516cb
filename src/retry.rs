//! Backoff for re-forwarding transient sink failures.

use crate::config::RetrySettings;
use std::time::Duration;

/// Exponential backoff with optional jitter
///
/// Internal type - users configure retries via `RetrySettings` in `BridgeConfig`.
#[derive(Debug, Clone)]
pub(crate) struct RetryStrategy {
    /// Maximum number of retries after the first attempt
    max_retries: u32,
    /// Delay before the first retry, in milliseconds
    base_backoff_ms: u64,
    /// Cap for any single delay, in milliseconds
    max_backoff_ms: u64,
    /// Growth factor between consecutive delays
    multiplier: f64,
    /// Randomize each delay to spread out retries from parallel workers
    jitter: bool,
}

impl RetryStrategy {
    pub(crate) fn new(max_retries: u32, base_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            base_backoff_ms,
            max_backoff_ms,
            multiplier: 2.0,
            jitter: true,
        }
    }

    pub(crate) fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_retries,
            settings.retry_backoff_ms,
            settings.max_backoff_ms,
        )
    }

    /// Disable jitter
    #[cfg(test)]
    pub(crate) fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Calculate the backoff duration before retry number `attempt` (1-indexed)
    pub(crate) fn calculate_backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = (attempt - 1).min(i32::MAX as u32) as i32;
        let mut backoff_ms = self.base_backoff_ms as f64 * self.multiplier.powi(exponent);
        backoff_ms = backoff_ms.min(self.max_backoff_ms as f64);

        if self.jitter {
            use rand::Rng;
            let jitter_factor = rand::rng().random_range(0.5..1.5);
            backoff_ms = (backoff_ms * jitter_factor).min(self.max_backoff_ms as f64);
        }

        Duration::from_millis(backoff_ms as u64)
    }

    /// Check if another retry is allowed after `attempt` retries
    pub(crate) fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}
