//! HTTP client with connection pooling.
//!
//! Transfers are byte-exact: response bodies are never transparently
//! decompressed, so range slices can be stitched back together.

use crate::config::DownloadConfig;
use crate::error::{DownloadError, Result};
use reqwest::{
    Client, Response, StatusCode,
    header::{ACCEPT, ACCEPT_ENCODING, CONTENT_RANGE, HeaderMap, HeaderValue, RANGE, USER_AGENT},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

/// HTTP client shared by stream and segmented downloads.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: Arc<DownloadConfig>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("client", &"reqwest::Client")
            .field("config", &self.config)
            .finish()
    }
}

impl HttpClient {
    /// Create a new HTTP client with the given configuration.
    ///
    /// # Errors
    /// Returns error if client cannot be built.
    pub fn new(config: DownloadConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .pool_max_idle_per_host(config.max_connections_per_host)
            .tcp_nodelay(true)
            .no_gzip()
            .no_brotli()
            .no_deflate()
            .no_zstd()
            .redirect(reqwest::redirect::Policy::limited(10))
            .danger_accept_invalid_certs(!config.verify_ssl)
            .use_rustls_tls()
            .build()
            .map_err(|e| DownloadError::Config(e.to_string()))?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    /// Create a client with default configuration.
    ///
    /// # Errors
    /// Returns error if client cannot be built.
    pub fn with_defaults() -> Result<Self> {
        Self::new(DownloadConfig::default())
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &Arc<DownloadConfig> {
        &self.config
    }

    /// Send a GET request.
    ///
    /// # Errors
    /// Returns error if the request fails or the status is not a success.
    pub async fn get(&self, url: &Url) -> Result<Response> {
        debug!(url = %url, "GET request");
        let response = self
            .client
            .get(url.as_str())
            .headers(self.default_headers())
            .send()
            .await?;
        check_response(response).await
    }

    /// Send a GET request for an inclusive byte range.
    ///
    /// # Errors
    /// Returns error if the request fails or the status is not a success.
    pub async fn get_range(&self, url: &Url, start: u64, end: u64) -> Result<Response> {
        let range_value = format!("bytes={start}-{end}");
        let mut headers = self.default_headers();
        headers.insert(
            RANGE,
            HeaderValue::from_str(&range_value)
                .map_err(|e| DownloadError::Config(e.to_string()))?,
        );

        trace!(url = %url, range = %range_value, "GET range request");

        let response = self
            .client
            .get(url.as_str())
            .headers(headers)
            .send()
            .await?;
        check_response(response).await
    }

    /// Total length of `url` if the server honours byte ranges.
    ///
    /// Issues `Range: bytes=0-0` and expects `206` with a `Content-Range`
    /// carrying the full size. Any other success answer means no range support.
    ///
    /// # Errors
    /// Returns error if the request itself fails.
    pub async fn probe_range(&self, url: &Url) -> Result<Option<u64>> {
        let response = self.get_range(url, 0, 0).await?;
        if response.status() != StatusCode::PARTIAL_CONTENT {
            debug!(url = %url, status = %response.status(), "server ignored range request");
            return Ok(None);
        }
        let total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);
        debug!(url = %url, total = ?total, "range probe");
        Ok(total)
    }

    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Ok(ua) = HeaderValue::from_str(&self.config.user_agent) {
            headers.insert(USER_AGENT, ua);
        }

        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

        headers
    }
}

async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let domain = response.url().host_str().unwrap_or("unknown").to_string();

    match status {
        StatusCode::NOT_FOUND => Err(DownloadError::NotFound { url }),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(DownloadError::Forbidden {
            domain,
            message: format!("HTTP {}", status.as_u16()),
        }),
        StatusCode::RANGE_NOT_SATISFIABLE => Err(DownloadError::RangeNotSupported { url }),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);

            Err(DownloadError::RateLimited {
                domain,
                retry_after,
            })
        }
        _ if status.is_server_error() => Err(DownloadError::ServerError {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_else(|_| status.to_string()),
        }),
        _ => Err(DownloadError::network_with_status(
            format!("HTTP {status}"),
            status.as_u16(),
        )),
    }
}

/// Total size from a `Content-Range: bytes a-b/total` header.
fn parse_content_range_total(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (_, total) = rest.split_once('/')?;
    total.trim().parse().ok()
}
