//! Retry policy for page and cover fetches.
//!
//! Implements linear backoff: the wait after attempt `n` is `n * delay_unit`.

use crate::config::DownloadManagerSettings;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub delay_unit: Duration,
}

impl RetryPolicy {
    pub fn new(config: &DownloadManagerSettings) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay_unit: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// How long to wait after the failed `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.delay_unit * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&DownloadManagerSettings::default())
    }
}
