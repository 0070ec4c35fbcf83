//! Configuration types for the downloader.

use overture_config::Settings;
use std::time::Duration;

/// Download configuration with all options.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Connection timeout for initial TCP connection.
    pub connect_timeout: Duration,
    /// Read timeout for data transfer.
    pub read_timeout: Duration,
    /// Deadline for one segment attempt.
    pub segment_timeout: Duration,
    /// Retries per candidate URL for transient failures.
    pub max_retries: u32,
    /// Retries per segment before the candidate is abandoned.
    pub segment_retries: u32,
    /// Base delay for exponential backoff.
    pub retry_base_delay: Duration,
    /// Maximum delay between retries.
    pub retry_max_delay: Duration,
    /// Default segment count for multi-threaded downloads.
    pub threads: u32,
    /// Whether multi-threaded downloads are allowed.
    pub multi_thread: bool,
    /// Verification failures tolerated before giving up on the chain.
    pub max_verification_failures: u32,
    /// Verify TLS certificates.
    pub verify_ssl: bool,
    /// Maximum concurrent connections per host.
    pub max_connections_per_host: usize,
    /// User agent string.
    pub user_agent: String,
    /// Buffer size for copying segments.
    pub buffer_size: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            segment_timeout: Duration::from_secs(300),
            max_retries: 3,
            segment_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(30),
            threads: 4,
            multi_thread: true,
            max_verification_failures: 3,
            verify_ssl: true,
            max_connections_per_host: 8,
            user_agent: format!("overture/{}", env!("CARGO_PKG_VERSION")),
            buffer_size: 128 * 1024, // 128KB
        }
    }
}

impl DownloadConfig {
    /// Create a new config builder.
    #[must_use]
    pub fn builder() -> DownloadConfigBuilder {
        DownloadConfigBuilder::default()
    }

    /// Derive the download configuration from loaded settings.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        let d = &settings.download;
        Self::builder()
            .connect_timeout(Duration::from_secs(d.connect_timeout_secs))
            .read_timeout(Duration::from_secs(d.read_timeout_secs))
            .threads(d.threads)
            .multi_thread(d.multi_thread)
            .max_retries(d.max_retries)
            .segment_retries(d.segment_retries)
            .max_verification_failures(d.max_verification_failures)
            .build()
    }
}

/// Builder for `DownloadConfig`.
#[derive(Debug, Default)]
pub struct DownloadConfigBuilder {
    config: DownloadConfig,
}

impl DownloadConfigBuilder {
    /// Set connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set read timeout.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set per-segment deadline.
    #[must_use]
    pub const fn segment_timeout(mut self, timeout: Duration) -> Self {
        self.config.segment_timeout = timeout;
        self
    }

    /// Set maximum retries per candidate.
    #[must_use]
    pub const fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set maximum retries per segment.
    #[must_use]
    pub const fn segment_retries(mut self, retries: u32) -> Self {
        self.config.segment_retries = retries;
        self
    }

    /// Set backoff delays.
    #[must_use]
    pub const fn retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.config.retry_base_delay = base;
        self.config.retry_max_delay = max;
        self
    }

    /// Set default segment count.
    #[must_use]
    pub const fn threads(mut self, threads: u32) -> Self {
        self.config.threads = threads;
        self
    }

    /// Enable or disable multi-threaded downloads.
    #[must_use]
    pub const fn multi_thread(mut self, enabled: bool) -> Self {
        self.config.multi_thread = enabled;
        self
    }

    /// Set tolerated verification failures.
    #[must_use]
    pub const fn max_verification_failures(mut self, failures: u32) -> Self {
        self.config.max_verification_failures = failures;
        self
    }

    /// Enable or disable certificate verification.
    #[must_use]
    pub const fn verify_ssl(mut self, verify: bool) -> Self {
        self.config.verify_ssl = verify;
        self
    }

    /// Set user agent.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> DownloadConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_settings_defaults() {
        let from_settings = DownloadConfig::from_settings(&Settings::default());
        let default = DownloadConfig::default();
        assert_eq!(from_settings.threads, default.threads);
        assert_eq!(from_settings.max_retries, default.max_retries);
        assert_eq!(from_settings.multi_thread, default.multi_thread);
    }

    #[test]
    fn builder_overrides() {
        let config = DownloadConfig::builder()
            .threads(8)
            .multi_thread(false)
            .segment_retries(1)
            .retry_delays(Duration::from_millis(1), Duration::from_millis(2))
            .build();
        assert_eq!(config.threads, 8);
        assert!(!config.multi_thread);
        assert_eq!(config.segment_retries, 1);
        assert_eq!(config.retry_base_delay, Duration::from_millis(1));
    }
}
