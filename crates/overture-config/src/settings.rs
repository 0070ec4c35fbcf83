//! Typed settings persisted in `config.json`.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};

/// Upper bound for download threads.
pub const MAX_THREADS: u32 = 32;

/// Configure flags applied to every PHP source build.
pub const DEFAULT_CONFIGURE_FLAGS: &[&str] = &[
    "--enable-mbstring",
    "--with-openssl",
    "--with-zlib",
    "--enable-bcmath",
    "--with-curl",
    "--enable-fpm",
];

/// All Overture settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Download behaviour.
    pub download: DownloadSettings,
    /// Source build behaviour.
    pub build: BuildSettings,
    /// Mirror speed-test behaviour.
    pub speed_test: SpeedTestSettings,
}

/// Download section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    /// Concurrent segments per download.
    pub threads: u32,
    /// Use segmented downloads when the server supports ranges.
    pub multi_thread: bool,
    /// TCP connect timeout.
    pub connect_timeout_secs: u64,
    /// Read timeout per request.
    pub read_timeout_secs: u64,
    /// Transport retries per candidate URL.
    pub max_retries: u32,
    /// Retries per segment before the candidate fails.
    pub segment_retries: u32,
    /// Checksum rejections tolerated before giving up.
    pub max_verification_failures: u32,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            threads: 4,
            multi_thread: true,
            connect_timeout_secs: 10,
            read_timeout_secs: 60,
            max_retries: 3,
            segment_retries: 3,
            max_verification_failures: 3,
        }
    }
}

/// Build section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    /// `make -j` value; CPU count when unset.
    pub jobs: Option<usize>,
    /// Flags passed to every configure run.
    pub baseline_configure_flags: Vec<String>,
    /// Keep build logs after a successful build.
    pub keep_logs: bool,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            jobs: None,
            baseline_configure_flags: DEFAULT_CONFIGURE_FLAGS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            keep_logs: true,
        }
    }
}

impl BuildSettings {
    /// Effective parallel job count.
    #[must_use]
    pub fn effective_jobs(&self) -> usize {
        self.jobs
            .filter(|j| *j > 0)
            .unwrap_or_else(|| overture_platform::Platform::current().cpus)
    }
}

/// Speed-test section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedTestSettings {
    /// Ranking cache lifetime.
    pub ttl_secs: u64,
    /// Concurrent probes.
    pub concurrency: usize,
    /// Per-probe timeout.
    pub timeout_secs: u64,
}

impl Default for SpeedTestSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            concurrency: 8,
            timeout_secs: 5,
        }
    }
}

impl Settings {
    /// Check value ranges.
    ///
    /// # Errors
    /// Returns [`ConfigError::OutOfRange`] for a single violation and
    /// [`ConfigError::ValidationFailed`] when several fields are wrong.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        let threads = self.download.threads;
        if !(1..=MAX_THREADS).contains(&threads) {
            errors.push(ConfigError::out_of_range("download.threads", threads, 1, MAX_THREADS));
        }
        if self.speed_test.ttl_secs == 0 {
            errors.push(ConfigError::out_of_range(
                "speed_test.ttl_secs",
                0,
                1,
                u64::MAX,
            ));
        }
        if self.speed_test.concurrency == 0 {
            errors.push(ConfigError::out_of_range(
                "speed_test.concurrency",
                0,
                1,
                usize::MAX,
            ));
        }
        if self.speed_test.timeout_secs == 0 {
            errors.push(ConfigError::out_of_range("speed_test.timeout_secs", 0, 1, 600));
        }
        if errors.len() > 1 {
            return Err(ConfigError::ValidationFailed {
                count: errors.len(),
                errors: errors.iter().map(ToString::to_string).collect(),
            });
        }
        errors.pop().map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn defaults_are_valid() {
        Settings::default().validate().unwrap();
        assert_eq!(Settings::default().download.threads, 4);
    }

    #[test_case(0 ; "zero")]
    #[test_case(33 ; "above max")]
    fn thread_count_out_of_range(threads: u32) {
        let mut s = Settings::default();
        s.download.threads = threads;
        assert!(matches!(s.validate(), Err(ConfigError::OutOfRange { .. })));
    }

    #[test]
    fn several_violations_are_collected() {
        let mut s = Settings::default();
        s.download.threads = 0;
        s.speed_test.ttl_secs = 0;
        match s.validate() {
            Err(ConfigError::ValidationFailed { count, .. }) => assert_eq!(count, 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn partial_file_fills_defaults() {
        let s: Settings = sonic_rs::from_str(r#"{"download":{"threads":2}}"#).unwrap();
        assert_eq!(s.download.threads, 2);
        assert!(s.download.multi_thread);
        assert_eq!(s.speed_test.ttl_secs, 3600);
        assert!(s.build.baseline_configure_flags.contains(&"--enable-fpm".to_string()));
    }
}
