//! Wiremock-backed mirrors that behave like php.net distribution hosts.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// How a served file answers `Range` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeMode {
    /// `206` slices with `Content-Range`.
    Honour,
    /// Ignore `Range` and return the full body.
    Ignore,
    /// Accept the `bytes=0-0` probe but return short slices afterwards.
    Truncate,
    /// Accept the `bytes=0-0` probe but answer every other range with the
    /// full body and `200`.
    ProbeOnly,
}

/// Serves one file, slicing it for byte-range requests.
#[derive(Debug, Clone)]
pub struct RangeResponder {
    body: Arc<Vec<u8>>,
    mode: RangeMode,
    hits: Arc<AtomicUsize>,
}

impl RangeResponder {
    /// Serve `body` with the given range behaviour.
    #[must_use]
    pub fn new(body: Vec<u8>, mode: RangeMode) -> Self {
        Self {
            body: Arc::new(body),
            mode,
            hits: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Requests answered so far.
    #[must_use]
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Parse `bytes=a-b` (inclusive, `b` optional) against `len`.
fn parse_range(value: &str, len: u64) -> Option<(u64, u64)> {
    let spec = value.trim().strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    let end: u64 = if end.trim().is_empty() {
        len.checked_sub(1)?
    } else {
        end.trim().parse().ok()?
    };
    (start <= end && start < len).then(|| (start, end.min(len - 1)))
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.hits.fetch_add(1, Ordering::SeqCst);
        let len = self.body.len() as u64;
        let range = request
            .headers
            .get("range")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let Some(range) = range.filter(|_| self.mode != RangeMode::Ignore) else {
            return ResponseTemplate::new(200).set_body_bytes(self.body.as_slice());
        };
        let Some((start, end)) = parse_range(&range, len) else {
            return ResponseTemplate::new(416).insert_header("content-range", format!("bytes */{len}"));
        };

        if self.mode == RangeMode::ProbeOnly && (start, end) != (0, 0) {
            return ResponseTemplate::new(200).set_body_bytes(self.body.as_slice());
        }

        let mut slice = self.body[start as usize..=end as usize].to_vec();
        if self.mode == RangeMode::Truncate && slice.len() > 1 {
            slice.pop();
        }
        ResponseTemplate::new(206)
            .insert_header("content-range", format!("bytes {start}-{end}/{len}"))
            .insert_header("accept-ranges", "bytes")
            .set_body_bytes(slice)
    }
}

/// A running mock mirror.
#[derive(Debug)]
pub struct MockMirror {
    server: MockServer,
}

impl MockMirror {
    /// Start an online mirror that answers `HEAD` probes with `200`.
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Self { server }
    }

    /// Start a mirror that answers every request with `503`.
    pub async fn start_offline() -> Self {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Self { server }
    }

    /// Base URL.
    #[must_use]
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Absolute URL for `path` (which starts with `/`).
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{path}", self.server.uri())
    }

    /// Serve `body` at `path` with range support.
    pub async fn serve(&self, path: &str, body: Vec<u8>) -> RangeResponder {
        self.serve_with(path, body, RangeMode::Honour).await
    }

    /// Serve `body` at `path`, ignoring `Range` headers.
    pub async fn serve_without_ranges(&self, path: &str, body: Vec<u8>) -> RangeResponder {
        self.serve_with(path, body, RangeMode::Ignore).await
    }

    /// Serve `body` at `path`, cutting every multi-byte slice short.
    pub async fn serve_broken_ranges(&self, path: &str, body: Vec<u8>) -> RangeResponder {
        self.serve_with(path, body, RangeMode::Truncate).await
    }

    /// Serve `body` at `path` with an explicit range mode.
    pub async fn serve_with(&self, path_str: &str, body: Vec<u8>, mode: RangeMode) -> RangeResponder {
        let responder = RangeResponder::new(body, mode);
        Mock::given(method("GET"))
            .and(path(path_str))
            .respond_with(responder.clone())
            .mount(&self.server)
            .await;
        responder
    }

    /// Serve a text body.
    pub async fn serve_text(&self, path_str: &str, body: impl Into<String>) {
        Mock::given(method("GET"))
            .and(path(path_str))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.into()))
            .mount(&self.server)
            .await;
    }

    /// Serve a text body only when the query carries `key=value`.
    pub async fn serve_text_for_query(
        &self,
        path_str: &str,
        key: &str,
        value: &str,
        body: impl Into<String>,
    ) {
        Mock::given(method("GET"))
            .and(path(path_str))
            .and(query_param(key, value))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.into()))
            .mount(&self.server)
            .await;
    }

    /// Answer `path` with `status`.
    pub async fn serve_status(&self, path_str: &str, status: u16) {
        Mock::given(path(path_str))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Number of `GET` requests received (probes excluded).
    pub async fn get_requests(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|reqs| reqs.iter().filter(|r| r.method.as_str() == "GET").count())
            .unwrap_or(0)
    }

    /// Number of requests of any kind received.
    pub async fn total_requests(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|reqs| reqs.len())
            .unwrap_or(0)
    }
}
