//! Transport-level error types for the downloader.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Download error type.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Network request failed.
    #[error("network error: {message}")]
    Network {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status_code: Option<u16>,
        /// Whether this error is retryable.
        retryable: bool,
    },

    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Request or segment exceeded its deadline.
    #[error("timeout after {duration:?} for {url}")]
    Timeout {
        /// URL being fetched.
        url: String,
        /// Deadline that elapsed.
        duration: Duration,
    },

    /// IO error.
    #[error("IO error at {path}: {message}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Archive extraction failed.
    #[error("archive error: {0}")]
    Archive(String),

    /// Rate limited by server.
    #[error("rate limited by {domain}, retry after {retry_after:?}")]
    RateLimited {
        /// Domain that rate limited.
        domain: String,
        /// Time to wait before retrying.
        retry_after: Option<Duration>,
    },

    /// Server error (5xx).
    #[error("server error {status}: {message}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// Resource not found (404).
    #[error("not found: {url}")]
    NotFound {
        /// URL that was not found.
        url: String,
    },

    /// Access denied (401/403).
    #[error("access denied by {domain}: {message}")]
    Forbidden {
        /// Domain that refused.
        domain: String,
        /// Error message.
        message: String,
    },

    /// Server ignored or rejected a byte-range request.
    #[error("range requests not honoured by {url}")]
    RangeNotSupported {
        /// URL.
        url: String,
    },

    /// Body length differs from what the server announced.
    #[error("expected {expected} bytes from {url}, received {actual}")]
    LengthMismatch {
        /// URL.
        url: String,
        /// Announced length.
        expected: u64,
        /// Bytes received.
        actual: u64,
    },

    /// A segment kept failing after its retries.
    #[error("segment {index} ({start}-{end}) failed: {message}")]
    SegmentFailed {
        /// Segment index.
        index: usize,
        /// First byte offset.
        start: u64,
        /// Last byte offset (inclusive).
        end: u64,
        /// Last failure.
        message: String,
    },

    /// Invalid URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl DownloadError {
    /// Create a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            status_code: None,
            retryable: true,
        }
    }

    /// Create a network error with status code.
    #[must_use]
    pub fn network_with_status(message: impl Into<String>, status: u16) -> Self {
        let retryable = matches!(status, 408 | 429 | 500 | 502 | 503 | 504);
        Self::Network {
            message: message.into(),
            status_code: Some(status),
            retryable,
        }
    }

    /// Create an IO error.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Check if error is retryable against the same URL.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Network { retryable, .. } => *retryable,
            Self::Connection(_)
            | Self::Timeout { .. }
            | Self::RateLimited { .. }
            | Self::ServerError { .. }
            | Self::LengthMismatch { .. } => true,
            _ => false,
        }
    }

    /// Check if this is a not found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Convert from reqwest error with context.
    #[must_use]
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let url = err.url().map(ToString::to_string).unwrap_or_default();
        if err.is_timeout() {
            return Self::Timeout {
                url,
                duration: Duration::ZERO,
            };
        }
        if err.is_connect() {
            return Self::Connection(err.to_string());
        }
        if let Some(status) = err.status() {
            let code = status.as_u16();
            return match code {
                404 => Self::NotFound { url },
                401 | 403 => Self::Forbidden {
                    domain: err
                        .url()
                        .and_then(|u| u.host_str())
                        .unwrap_or("unknown")
                        .to_string(),
                    message: format!("HTTP {code}"),
                },
                _ => Self::network_with_status(err.to_string(), code),
            };
        }
        Self::network(err.to_string())
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::new(),
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        Self::from_reqwest(err)
    }
}

impl From<url::ParseError> for DownloadError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<DownloadError> for overture_core::Error {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::Io { path, message } => Self::Io {
                code: overture_core::ErrorCode::E0604,
                path,
                message,
            },
            DownloadError::Archive(message) => Self::archive(message),
            DownloadError::Config(message) => Self::config(message),
            DownloadError::NotFound { ref url } => Self::network(err.to_string(), Some(url.clone())),
            DownloadError::Timeout { ref url, .. }
            | DownloadError::RangeNotSupported { ref url }
            | DownloadError::LengthMismatch { ref url, .. } => {
                Self::network(err.to_string(), Some(url.clone()))
            }
            other => Self::network(other.to_string(), None),
        }
    }
}

/// Result type for download operations.
pub type Result<T> = std::result::Result<T, DownloadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(DownloadError::network("test").is_retryable());
        assert!(DownloadError::Connection("refused".into()).is_retryable());
        assert!(
            DownloadError::Timeout {
                url: "https://a.example".into(),
                duration: Duration::from_secs(1),
            }
            .is_retryable()
        );
        assert!(DownloadError::network_with_status("busy", 503).is_retryable());
        assert!(!DownloadError::network_with_status("gone", 410).is_retryable());
        assert!(!DownloadError::NotFound { url: "x".into() }.is_retryable());
        assert!(!DownloadError::RangeNotSupported { url: "x".into() }.is_retryable());
    }

    #[test]
    fn not_found_detection() {
        assert!(DownloadError::NotFound { url: "x".into() }.is_not_found());
        assert!(!DownloadError::network("test").is_not_found());
    }

    #[test]
    fn converts_into_core_error_with_url() {
        let err: overture_core::Error = DownloadError::NotFound {
            url: "https://a.example/php.tgz".into(),
        }
        .into();
        match err {
            overture_core::Error::Network { url, .. } => {
                assert_eq!(url.as_deref(), Some("https://a.example/php.tgz"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
