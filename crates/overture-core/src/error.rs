//! Error types for Overture operations.
//!
//! Each error has:
//! - A unique error code (e.g., E0201) for easy reference and searching
//! - A message carrying enough context to diagnose without re-running
//! - Suggestions for how to fix the issue

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Error codes for Overture errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Mirror configuration errors (E01xx)
    /// Mirror URL lacks a scheme or host
    E0101,
    /// Mirror not present in the registry
    E0102,

    // Download errors (E02xx)
    /// Every candidate URL failed
    E0201,
    /// Network request failed
    E0202,

    // Integrity errors (E03xx)
    /// Checksum did not match the reference
    E0301,
    /// No reference checksum available
    E0302,

    // Version errors (E04xx)
    /// No available version matches the request
    E0401,
    /// Version is not installed
    E0402,
    /// Version is referenced by a pointer
    E0403,
    /// Version spec could not be parsed
    E0404,

    // Build errors (E05xx)
    /// Build step exited with failure
    E0501,
    /// Auto-repair could not install prerequisites
    E0502,

    // IO errors (E06xx)
    /// File not found
    E0601,
    /// Permission denied
    E0602,
    /// Persisted state file is corrupt
    E0603,
    /// Other IO failure
    E0604,

    // Configuration errors (E07xx)
    /// Invalid configuration
    E0701,
    /// Invalid install option
    E0702,

    // Archive errors (E08xx)
    /// Archive extraction failed
    E0801,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::E0101 => "E0101",
            Self::E0102 => "E0102",
            Self::E0201 => "E0201",
            Self::E0202 => "E0202",
            Self::E0301 => "E0301",
            Self::E0302 => "E0302",
            Self::E0401 => "E0401",
            Self::E0402 => "E0402",
            Self::E0403 => "E0403",
            Self::E0404 => "E0404",
            Self::E0501 => "E0501",
            Self::E0502 => "E0502",
            Self::E0601 => "E0601",
            Self::E0602 => "E0602",
            Self::E0603 => "E0603",
            Self::E0604 => "E0604",
            Self::E0701 => "E0701",
            Self::E0702 => "E0702",
            Self::E0801 => "E0801",
        }
    }

    /// Get a brief title for this error code.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::E0101 => "Invalid mirror URL",
            Self::E0102 => "Mirror not found",
            Self::E0201 => "Download exhausted",
            Self::E0202 => "Network error",
            Self::E0301 => "Signature mismatch",
            Self::E0302 => "Reference unavailable",
            Self::E0401 => "Unknown version",
            Self::E0402 => "Version not installed",
            Self::E0403 => "Version in use",
            Self::E0404 => "Invalid version spec",
            Self::E0501 => "Build failed",
            Self::E0502 => "Environment repair failed",
            Self::E0601 => "File not found",
            Self::E0602 => "Permission denied",
            Self::E0603 => "Corrupt state file",
            Self::E0604 => "IO error",
            Self::E0701 => "Invalid configuration",
            Self::E0702 => "Invalid option",
            Self::E0801 => "Extraction failed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One failed candidate in a download chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttempt {
    /// URL that was tried.
    pub url: String,
    /// Why it failed.
    pub reason: String,
}

impl fmt::Display for FailedAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.url, self.reason)
    }
}

/// Main error type for Overture.
#[derive(Error, Debug)]
pub enum Error {
    /// Mirror URL failed validation.
    #[error("[E0101] invalid mirror URL '{url}': {reason}")]
    InvalidMirrorUrl {
        /// Rejected URL.
        url: String,
        /// Validation failure.
        reason: String,
    },

    /// Mirror URL is not registered for the resource class.
    #[error("[E0102] mirror '{url}' is not configured for {class}")]
    MirrorNotFound {
        /// Resource class key.
        class: String,
        /// Missing URL.
        url: String,
    },

    /// All candidates in the download chain failed.
    #[error("[E0201] could not download {artifact}: {} candidate(s) failed", .attempted.len())]
    DownloadExhausted {
        /// Artifact description.
        artifact: String,
        /// Every URL tried, in order.
        attempted: Vec<FailedAttempt>,
    },

    /// Network error outside a download chain.
    #[error("[E0202] network error: {message}")]
    Network {
        /// Error message.
        message: String,
        /// URL that failed (if applicable).
        url: Option<String>,
    },

    /// Downloaded bytes do not match the reference checksum.
    #[error("[E0301] checksum mismatch for {artifact}: expected {expected}, got {actual}")]
    SignatureMismatch {
        /// Artifact description.
        artifact: String,
        /// Reference checksum.
        expected: String,
        /// Computed checksum.
        actual: String,
        /// Every URL tried, in order.
        attempted: Vec<FailedAttempt>,
    },

    /// The verifier could not obtain a reference value.
    #[error("[E0302] cannot verify {artifact}: {reason}")]
    ReferenceUnavailable {
        /// Artifact description.
        artifact: String,
        /// Why no reference exists.
        reason: String,
    },

    /// No available version satisfies the request.
    #[error("[E0401] no available version matches '{spec}'")]
    UnknownVersion {
        /// Requested spec.
        spec: String,
        /// Newest available versions (for suggestions).
        available: Vec<String>,
    },

    /// Version is not present in the registry.
    #[error("[E0402] PHP {version} is not installed")]
    VersionNotInstalled {
        /// Requested version.
        version: String,
    },

    /// Version is referenced by the global pointer or a project pin.
    #[error("[E0403] PHP {version} is in use by {}", .usages.join(", "))]
    VersionInUse {
        /// Version that was targeted.
        version: String,
        /// Pointers referencing it.
        usages: Vec<String>,
    },

    /// Version spec could not be parsed.
    #[error("[E0404] invalid version '{spec}': {reason}")]
    InvalidVersionSpec {
        /// Raw input.
        spec: String,
        /// Parse failure.
        reason: String,
    },

    /// A build subprocess exited unsuccessfully.
    #[error("[E0501] {step} failed for {target} (exit code {})", .exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    BuildFailed {
        /// What was being built.
        target: String,
        /// Step name (configure, make, ...).
        step: String,
        /// Process exit code, if it exited normally.
        exit_code: Option<i32>,
        /// Full build log.
        log_path: PathBuf,
        /// Last lines of output.
        excerpt: Vec<String>,
    },

    /// Auto-repair could not install prerequisites.
    #[error("[E0502] could not install build prerequisites: {message}")]
    EnvironmentRepairFailed {
        /// Failure summary.
        message: String,
        /// Detected package manager.
        manager: Option<String>,
        /// Packages that were requested.
        packages: Vec<String>,
    },

    /// IO error.
    #[error("[{code}] io error at {path}: {message}")]
    Io {
        /// Error code.
        code: ErrorCode,
        /// File path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// JSON error.
    #[error("[E0603] json error: {0}")]
    Json(#[from] sonic_rs::Error),

    /// Persisted state file could not be read back.
    #[error("[E0603] corrupt state file {path}: {message}")]
    CorruptState {
        /// File path.
        path: PathBuf,
        /// Parse failure.
        message: String,
    },

    /// Configuration error.
    #[error("[E0701] config error: {message}")]
    Config {
        /// Error message.
        message: String,
        /// Configuration key.
        key: Option<String>,
    },

    /// Unknown or invalid option.
    #[error("[E0702] invalid option '{option}': {message}")]
    InvalidOption {
        /// Option name.
        option: String,
        /// Why it was rejected.
        message: String,
    },

    /// Archive error.
    #[error("[E0801] archive error: {message}")]
    Archive {
        /// Error message.
        message: String,
        /// Archive path.
        path: Option<PathBuf>,
    },
}

impl Error {
    /// Get the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidMirrorUrl { .. } => ErrorCode::E0101,
            Self::MirrorNotFound { .. } => ErrorCode::E0102,
            Self::DownloadExhausted { .. } => ErrorCode::E0201,
            Self::Network { .. } => ErrorCode::E0202,
            Self::SignatureMismatch { .. } => ErrorCode::E0301,
            Self::ReferenceUnavailable { .. } => ErrorCode::E0302,
            Self::UnknownVersion { .. } => ErrorCode::E0401,
            Self::VersionNotInstalled { .. } => ErrorCode::E0402,
            Self::VersionInUse { .. } => ErrorCode::E0403,
            Self::InvalidVersionSpec { .. } => ErrorCode::E0404,
            Self::BuildFailed { .. } => ErrorCode::E0501,
            Self::EnvironmentRepairFailed { .. } => ErrorCode::E0502,
            Self::Io { code, .. } => *code,
            Self::Json(_) | Self::CorruptState { .. } => ErrorCode::E0603,
            Self::Config { .. } => ErrorCode::E0701,
            Self::InvalidOption { .. } => ErrorCode::E0702,
            Self::Archive { .. } => ErrorCode::E0801,
        }
    }

    /// Whether the error is a request-validation failure that must never be retried.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidMirrorUrl { .. }
                | Self::MirrorNotFound { .. }
                | Self::UnknownVersion { .. }
                | Self::VersionNotInstalled { .. }
                | Self::VersionInUse { .. }
                | Self::InvalidVersionSpec { .. }
                | Self::InvalidOption { .. }
        )
    }

    /// Get suggestions for fixing this error.
    #[must_use]
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidMirrorUrl { .. } => vec![
                "Mirror URLs need a scheme and host, e.g. https://mirror.example.com/php".to_string(),
            ],
            Self::MirrorNotFound { class, .. } => {
                vec![format!("List configured mirrors: overture mirror list {class}")]
            }
            Self::DownloadExhausted { attempted, .. } => {
                let mut out: Vec<String> = attempted.iter().map(ToString::to_string).collect();
                out.push("Re-rank mirrors: overture mirror speed-test".to_string());
                out.push("Enable the official fallback: overture mirror auto-fallback on".to_string());
                out
            }
            Self::Network { url, .. } => {
                let mut out = vec!["Check your internet connection and proxy settings".to_string()];
                if let Some(u) = url {
                    out.push(format!("Try accessing {u} in a browser"));
                }
                out
            }
            Self::SignatureMismatch { attempted, .. } => {
                let mut out = vec![
                    "The artifact was rejected and not cached".to_string(),
                    "A mirror may be serving a corrupted or tampered file".to_string(),
                ];
                out.extend(attempted.iter().map(ToString::to_string));
                out
            }
            Self::ReferenceUnavailable { .. } => vec![
                "Pin a checksum in checksums.json under the Overture home".to_string(),
                "Or install with --no-verify if you trust the source".to_string(),
            ],
            Self::UnknownVersion { available, .. } => {
                let mut out = vec!["List installable versions: overture list --available".to_string()];
                if !available.is_empty() {
                    out.push(format!("Newest available: {}", available.join(", ")));
                }
                out
            }
            Self::VersionNotInstalled { version } => {
                vec![format!("Install it first: overture install {version}")]
            }
            Self::VersionInUse { usages, .. } => {
                let mut out = vec![
                    "Switch or unpin first, or pass --force to clear the pointers".to_string(),
                ];
                out.extend(usages.iter().map(|u| format!("Referenced by {u}")));
                out
            }
            Self::InvalidVersionSpec { .. } => {
                vec!["Use X, X.Y or X.Y.Z, e.g. 8.3 or 8.1.27".to_string()]
            }
            Self::BuildFailed {
                log_path, excerpt, ..
            } => {
                let mut out = vec![
                    format!("Full build log: {}", log_path.display()),
                    "Install missing prerequisites: overture doctor --fix".to_string(),
                ];
                if !excerpt.is_empty() {
                    out.push(format!("Last output:\n    {}", excerpt.join("\n    ")));
                }
                out
            }
            Self::EnvironmentRepairFailed {
                manager, packages, ..
            } => {
                let manager = manager.as_deref().unwrap_or("your package manager");
                vec![format!(
                    "Install manually with {manager}: {}",
                    packages.join(" ")
                )]
            }
            Self::Io { code, path, .. } => match code {
                ErrorCode::E0602 => vec![format!("Check permissions on: {}", path.display())],
                _ => vec![format!("Check the path: {}", path.display())],
            },
            Self::Json(_) | Self::CorruptState { .. } => {
                vec!["Delete or repair the file; it is rebuilt on next write".to_string()]
            }
            Self::Config { .. } => vec!["Check config.json under the Overture home".to_string()],
            Self::InvalidOption { .. } => {
                vec!["Run with --help to see supported options".to_string()]
            }
            Self::Archive { .. } => vec![
                "The archive may be corrupted. Clear it: overture cache clear --downloads".to_string(),
            ],
        }
    }

    /// Create an IO error with context.
    #[must_use]
    #[allow(clippy::needless_pass_by_value)]
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let code = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::E0601,
            std::io::ErrorKind::PermissionDenied => ErrorCode::E0602,
            _ => ErrorCode::E0604,
        };
        Self::Io {
            code,
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Create a network error.
    #[must_use]
    pub fn network(message: impl Into<String>, url: Option<String>) -> Self {
        Self::Network {
            message: message.into(),
            url,
        }
    }

    /// Create a config error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            key: None,
        }
    }

    /// Create an archive error.
    #[must_use]
    pub fn archive(message: impl Into<String>) -> Self {
        Self::Archive {
            message: message.into(),
            path: None,
        }
    }

    /// Create an invalid option error.
    #[must_use]
    pub fn invalid_option(option: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            message: message.into(),
        }
    }

    /// Format the error with suggestions for display.
    #[must_use]
    pub fn display_with_suggestions(&self) -> String {
        let mut output = format!("{self}");
        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            output.push_str("\n\nSuggestions:");
            for suggestion in suggestions {
                output.push_str(&format!("\n  - {suggestion}"));
            }
        }
        output.push_str(&format!("\n\n{}: {}", self.code(), self.code().title()));
        output
    }
}

/// Result type for Overture operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ErrorCode::E0201.as_str(), "E0201");
        assert_eq!(ErrorCode::E0403.title(), "Version in use");
    }

    #[test]
    fn test_download_exhausted_lists_attempts() {
        let err = Error::DownloadExhausted {
            artifact: "php 8.1.27".into(),
            attempted: vec![
                FailedAttempt {
                    url: "https://a.example/php-8.1.27.tar.gz".into(),
                    reason: "connection refused".into(),
                },
                FailedAttempt {
                    url: "https://b.example/php-8.1.27.tar.gz".into(),
                    reason: "timeout".into(),
                },
            ],
        };
        assert_eq!(err.code(), ErrorCode::E0201);
        assert!(err.to_string().contains("2 candidate(s)"));
        let display = err.display_with_suggestions();
        assert!(display.contains("https://a.example/php-8.1.27.tar.gz: connection refused"));
        assert!(display.contains("https://b.example/php-8.1.27.tar.gz: timeout"));
    }

    #[test]
    fn test_io_error_code_detection() {
        let missing = Error::io(
            "/nope",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(missing.code(), ErrorCode::E0601);

        let denied = Error::io(
            "/root",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no"),
        );
        assert_eq!(denied.code(), ErrorCode::E0602);
    }

    #[test]
    fn test_build_failed_carries_exit_code() {
        let err = Error::BuildFailed {
            target: "php 8.3.4".into(),
            step: "make".into(),
            exit_code: Some(2),
            log_path: PathBuf::from("/tmp/build.log"),
            excerpt: vec!["error: missing libxml2".into()],
        };
        assert!(err.to_string().contains("exit code 2"));
        assert!(err.display_with_suggestions().contains("missing libxml2"));
    }

    #[test]
    fn test_validation_classification() {
        assert!(
            Error::VersionInUse {
                version: "8.1.27".into(),
                usages: vec!["global".into()]
            }
            .is_validation()
        );
        assert!(!Error::network("refused", None).is_validation());
    }
}
