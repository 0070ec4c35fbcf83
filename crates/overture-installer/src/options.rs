//! Per-install options.

use overture_config::{MAX_THREADS, Settings};
use overture_core::{Error, Result};
use overture_registry::SwitchScope;

/// Options for one install request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    /// Compile from source instead of placing a prebuilt binary.
    pub from_source: bool,
    /// Keep the extracted source tree after building.
    pub keep_source: bool,
    /// Reuse verified cached artifacts.
    pub use_cache: bool,
    /// Segmented downloads when the server supports ranges.
    pub use_multi_thread: bool,
    /// Segments per download.
    pub thread_count: u32,
    /// Require a matching reference checksum.
    pub verify_signature: bool,
    /// Flags appended to the baseline configure flags.
    pub extra_configure_flags: Vec<String>,
    /// Pointer to move once the install is registered.
    pub switch_to: Option<SwitchScope>,
    /// Reinstall even when the version is already registered. A verified
    /// cached artifact is reused unless `use_cache` is off.
    pub reinstall: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            from_source: true,
            keep_source: false,
            use_cache: true,
            use_multi_thread: true,
            thread_count: 4,
            verify_signature: true,
            extra_configure_flags: Vec::new(),
            switch_to: None,
            reinstall: false,
        }
    }
}

/// Keys accepted by [`InstallOptions::from_pairs`].
pub const OPTION_KEYS: &[&str] = &[
    "from_source",
    "keep_source",
    "use_cache",
    "use_multi_thread",
    "thread_count",
    "verify_signature",
    "configure_flag",
    "use",
    "reinstall",
];

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::invalid_option(key, format!("expected a boolean, got `{other}`"))),
    }
}

impl InstallOptions {
    /// Defaults taken from settings.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            use_multi_thread: settings.download.multi_thread,
            thread_count: settings.download.threads,
            ..Self::default()
        }
    }

    /// Build options from `key=value` pairs on top of `self`.
    ///
    /// `configure_flag` may repeat. `use` takes `current` or `global`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidOption`] for unknown keys or malformed values.
    pub fn with_pairs<'a>(mut self, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        for (key, value) in pairs {
            match key {
                "from_source" => self.from_source = parse_bool(key, value)?,
                "keep_source" => self.keep_source = parse_bool(key, value)?,
                "use_cache" => self.use_cache = parse_bool(key, value)?,
                "use_multi_thread" => self.use_multi_thread = parse_bool(key, value)?,
                "verify_signature" => self.verify_signature = parse_bool(key, value)?,
                "reinstall" => self.reinstall = parse_bool(key, value)?,
                "thread_count" => {
                    self.thread_count = value.trim().parse().map_err(|_| {
                        Error::invalid_option(key, format!("expected a number, got `{value}`"))
                    })?;
                }
                "configure_flag" => self.extra_configure_flags.push(value.to_string()),
                "use" => {
                    self.switch_to = match value.trim() {
                        "current" => Some(SwitchScope::Current),
                        "global" => Some(SwitchScope::Global),
                        other => {
                            return Err(Error::invalid_option(
                                key,
                                format!("expected `current` or `global`, got `{other}`"),
                            ));
                        }
                    };
                }
                unknown => {
                    return Err(Error::invalid_option(
                        unknown,
                        format!("unknown install option; expected one of {}", OPTION_KEYS.join(", ")),
                    ));
                }
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Parse `key=value` pairs onto the defaults.
    ///
    /// # Errors
    /// See [`with_pairs`](Self::with_pairs).
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        Self::default().with_pairs(pairs)
    }

    /// Check value ranges and flag syntax.
    ///
    /// # Errors
    /// Returns [`Error::InvalidOption`] on the first violation.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_THREADS).contains(&self.thread_count) {
            return Err(Error::invalid_option(
                "thread_count",
                format!("must be between 1 and {MAX_THREADS}"),
            ));
        }
        for flag in &self.extra_configure_flags {
            if !flag.starts_with("--") || flag.len() < 3 {
                return Err(Error::invalid_option(
                    "configure_flag",
                    format!("`{flag}` is not a --with-*/--enable-* style flag"),
                ));
            }
            if flag.chars().any(|c| c.is_whitespace() || c == '\0') {
                return Err(Error::invalid_option(
                    "configure_flag",
                    format!("`{flag}` must be a single argument"),
                ));
            }
        }
        if !self.from_source && !self.extra_configure_flags.is_empty() {
            return Err(Error::invalid_option(
                "configure_flag",
                "configure flags only apply to source builds",
            ));
        }
        Ok(())
    }

    /// Enable or disable source builds.
    #[must_use]
    pub const fn from_source(mut self, from_source: bool) -> Self {
        self.from_source = from_source;
        self
    }

    /// Keep the source tree.
    #[must_use]
    pub const fn keep_source(mut self, keep: bool) -> Self {
        self.keep_source = keep;
        self
    }

    /// Enable or disable cache reuse.
    #[must_use]
    pub const fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Download threading.
    #[must_use]
    pub const fn threading(mut self, multi_thread: bool, threads: u32) -> Self {
        self.use_multi_thread = multi_thread;
        self.thread_count = threads;
        self
    }

    /// Enable or disable verification.
    #[must_use]
    pub const fn verify_signature(mut self, verify: bool) -> Self {
        self.verify_signature = verify;
        self
    }

    /// Switch after install.
    #[must_use]
    pub const fn switch_to(mut self, scope: Option<SwitchScope>) -> Self {
        self.switch_to = scope;
        self
    }

    /// Reinstall registered versions.
    #[must_use]
    pub const fn reinstall(mut self, reinstall: bool) -> Self {
        self.reinstall = reinstall;
        self
    }

    /// Append a configure flag.
    #[must_use]
    pub fn configure_flag(mut self, flag: impl Into<String>) -> Self {
        self.extra_configure_flags.push(flag.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn pairs_override_defaults() {
        let options = InstallOptions::from_pairs([
            ("from_source", "yes"),
            ("thread_count", "8"),
            ("configure_flag", "--with-pgsql"),
            ("configure_flag", "--enable-intl"),
            ("use", "global"),
        ])
        .unwrap();
        assert_eq!(options.thread_count, 8);
        assert_eq!(options.switch_to, Some(SwitchScope::Global));
        assert_eq!(
            options.extra_configure_flags,
            vec!["--with-pgsql".to_string(), "--enable-intl".to_string()]
        );
    }

    #[test_case("colour", "red" ; "unknown key")]
    #[test_case("thread_count", "0" ; "zero threads")]
    #[test_case("thread_count", "many" ; "non numeric threads")]
    #[test_case("use_cache", "maybe" ; "bad boolean")]
    #[test_case("use", "everywhere" ; "bad scope")]
    #[test_case("configure_flag", "with-gd" ; "flag without dashes")]
    #[test_case("configure_flag", "--with-gd --with-zip" ; "two flags in one")]
    fn invalid_pairs_are_rejected(key: &str, value: &str) {
        let err = InstallOptions::from_pairs([(key, value)]).unwrap_err();
        assert!(matches!(err, Error::InvalidOption { .. }));
    }

    #[test]
    fn prebuilt_installs_take_no_configure_flags() {
        let err = InstallOptions::default()
            .from_source(false)
            .configure_flag("--with-gd")
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOption { .. }));
    }
}
