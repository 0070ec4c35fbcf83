//! Retry logic with exponential backoff.

use crate::config::DownloadConfig;
use crate::error::{DownloadError, Result};
use backon::{ExponentialBuilder, Retryable};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration.
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Per-candidate retries from the download configuration.
    #[must_use]
    pub const fn for_requests(config: &DownloadConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
        }
    }

    /// Per-segment retries from the download configuration.
    #[must_use]
    pub const fn for_segments(config: &DownloadConfig) -> Self {
        Self {
            max_retries: config.segment_retries,
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
        }
    }

    fn build_backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries as usize)
            .with_jitter()
    }
}

/// Execute a fallible operation with retry and exponential backoff.
///
/// Only errors for which [`DownloadError::is_retryable`] holds are retried.
///
/// # Errors
/// Returns the last error after all retries are exhausted.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    operation
        .retry(config.build_backoff())
        .when(|e: &DownloadError| {
            let should_retry = e.is_retryable();
            if !should_retry {
                debug!(error = %e, "not retrying");
            }
            should_retry
        })
        .notify(|e: &DownloadError, dur: Duration| {
            warn!(error = %e, delay = ?dur, "operation failed, retrying");
        })
        .await
}
