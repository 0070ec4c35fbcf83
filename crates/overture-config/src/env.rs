//! Environment variable configuration support.

use crate::error::{ConfigError, Result};
use crate::settings::Settings;
use std::path::PathBuf;

/// Environment variables Overture reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OvertureEnvVar {
    /// `OVERTURE_HOME` - root of all Overture state.
    Home,
    /// `OVERTURE_THREADS` - download segment count.
    Threads,
    /// `OVERTURE_NO_MULTI_THREAD` - force single-stream downloads.
    NoMultiThread,
    /// `OVERTURE_SPEED_TEST_TTL` - speed-test cache lifetime in seconds.
    SpeedTestTtl,
    /// `OVERTURE_MAX_RETRIES` - transport retries per candidate.
    MaxRetries,
    /// `OVERTURE_SHELL_LINK` - per-shell `current` link path.
    ShellLink,
}

impl OvertureEnvVar {
    /// Get the environment variable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Home => "OVERTURE_HOME",
            Self::Threads => "OVERTURE_THREADS",
            Self::NoMultiThread => "OVERTURE_NO_MULTI_THREAD",
            Self::SpeedTestTtl => "OVERTURE_SPEED_TEST_TTL",
            Self::MaxRetries => "OVERTURE_MAX_RETRIES",
            Self::ShellLink => "OVERTURE_SHELL_LINK",
        }
    }

    /// Get the value from environment.
    #[must_use]
    pub fn get(self) -> Option<String> {
        std::env::var(self.as_str()).ok().filter(|v| !v.is_empty())
    }
}

fn parse_bool(var: OvertureEnvVar, raw: &str) -> Result<bool> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::EnvError {
            var: var.as_str().to_string(),
            message: format!("expected a boolean, got '{raw}'"),
        }),
    }
}

fn parse_num<T: std::str::FromStr>(var: OvertureEnvVar, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| ConfigError::EnvError {
        var: var.as_str().to_string(),
        message: format!("expected a non-negative integer, got '{raw}'"),
    })
}

/// Environment configuration reader.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    /// `OVERTURE_HOME` directory.
    pub home: Option<PathBuf>,
    /// Download thread count.
    pub threads: Option<u32>,
    /// Disable segmented downloads.
    pub no_multi_thread: bool,
    /// Speed-test TTL in seconds.
    pub speed_test_ttl: Option<u64>,
    /// Transport retries per candidate.
    pub max_retries: Option<u32>,
    /// Per-shell `current` link.
    pub shell_link: Option<PathBuf>,
}

impl EnvConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    /// Returns [`ConfigError::EnvError`] for values that do not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| var.get())
    }

    /// Read configuration through a custom lookup.
    ///
    /// # Errors
    /// Returns [`ConfigError::EnvError`] for values that do not parse.
    pub fn from_lookup(lookup: impl Fn(OvertureEnvVar) -> Option<String>) -> Result<Self> {
        use OvertureEnvVar as V;
        Ok(Self {
            home: lookup(V::Home).map(PathBuf::from),
            threads: lookup(V::Threads)
                .map(|raw| parse_num(V::Threads, &raw))
                .transpose()?,
            no_multi_thread: lookup(V::NoMultiThread)
                .map(|raw| parse_bool(V::NoMultiThread, &raw))
                .transpose()?
                .unwrap_or(false),
            speed_test_ttl: lookup(V::SpeedTestTtl)
                .map(|raw| parse_num(V::SpeedTestTtl, &raw))
                .transpose()?,
            max_retries: lookup(V::MaxRetries)
                .map(|raw| parse_num(V::MaxRetries, &raw))
                .transpose()?,
            shell_link: lookup(V::ShellLink).map(PathBuf::from),
        })
    }

    /// Apply environment overrides to settings.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(threads) = self.threads {
            settings.download.threads = threads;
        }
        if self.no_multi_thread {
            settings.download.multi_thread = false;
        }
        if let Some(ttl) = self.speed_test_ttl {
            settings.speed_test.ttl_secs = ttl;
        }
        if let Some(retries) = self.max_retries {
            settings.download.max_retries = retries;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(OvertureEnvVar, &str)]) -> impl Fn(OvertureEnvVar) -> Option<String> {
        let map: HashMap<OvertureEnvVar, String> =
            pairs.iter().map(|(k, v)| (*k, (*v).to_string())).collect();
        move |var| map.get(&var).cloned()
    }

    #[test]
    fn overrides_apply_over_file_settings() {
        let env = EnvConfig::from_lookup(lookup(&[
            (OvertureEnvVar::Threads, "8"),
            (OvertureEnvVar::NoMultiThread, "yes"),
            (OvertureEnvVar::SpeedTestTtl, "60"),
        ]))
        .unwrap();
        let mut settings = Settings::default();
        env.apply_to(&mut settings);
        assert_eq!(settings.download.threads, 8);
        assert!(!settings.download.multi_thread);
        assert_eq!(settings.speed_test.ttl_secs, 60);
        assert_eq!(settings.download.max_retries, 3);
    }

    #[test]
    fn malformed_number_is_an_env_error() {
        let err = EnvConfig::from_lookup(lookup(&[(OvertureEnvVar::Threads, "four")])).unwrap_err();
        assert!(matches!(err, ConfigError::EnvError { ref var, .. } if var == "OVERTURE_THREADS"));
    }

    #[test]
    fn malformed_bool_is_an_env_error() {
        assert!(
            EnvConfig::from_lookup(lookup(&[(OvertureEnvVar::NoMultiThread, "maybe")])).is_err()
        );
    }

    #[test]
    fn empty_environment_changes_nothing() {
        let env = EnvConfig::from_lookup(|_| None).unwrap();
        let mut settings = Settings::default();
        env.apply_to(&mut settings);
        assert_eq!(settings, Settings::default());
    }
}
