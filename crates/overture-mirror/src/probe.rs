//! Mirror reachability probes.

use crate::SpeedTestResult;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Measures one mirror.
#[async_trait]
pub trait MirrorProbe: Send + Sync {
    /// Probe `url`, classifying it as offline when `timeout` elapses.
    async fn probe(&self, url: &str, timeout: Duration) -> SpeedTestResult;
}

/// HEAD-request probe.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProbe").finish_non_exhaustive()
    }
}

impl HttpProbe {
    /// Build a probe client.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be constructed.
    pub fn new(verify_ssl: bool) -> overture_core::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("overture/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(!verify_ssl)
            .build()
            .map_err(|e| overture_core::Error::network(e.to_string(), None))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MirrorProbe for HttpProbe {
    async fn probe(&self, url: &str, timeout: Duration) -> SpeedTestResult {
        let start = Instant::now();
        let request = self.client.head(url).timeout(timeout).send();
        match tokio::time::timeout(timeout, request).await {
            Ok(Ok(response)) if response.status().as_u16() < 400 => {
                let ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                trace!(url, ms, status = %response.status(), "mirror online");
                SpeedTestResult::online(url, ms)
            }
            Ok(Ok(response)) => {
                debug!(url, status = %response.status(), "mirror returned error status");
                SpeedTestResult::offline(url)
            }
            Ok(Err(e)) => {
                debug!(url, error = %e, "mirror unreachable");
                SpeedTestResult::offline(url)
            }
            Err(_) => {
                debug!(url, ?timeout, "mirror probe timed out");
                SpeedTestResult::offline(url)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MirrorStatus;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn success_status_is_online() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let probe = HttpProbe::new(true).unwrap();
        let result = probe.probe(&server.uri(), Duration::from_secs(2)).await;
        assert_eq!(result.status, MirrorStatus::Online);
        assert!(result.response_time_ms.is_some());
    }

    #[tokio::test]
    async fn error_status_is_offline() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let probe = HttpProbe::new(true).unwrap();
        let result = probe.probe(&server.uri(), Duration::from_secs(2)).await;
        assert_eq!(result, SpeedTestResult::offline(server.uri()));
    }

    #[tokio::test]
    async fn slow_mirror_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;
        let probe = HttpProbe::new(true).unwrap();
        let result = probe.probe(&server.uri(), Duration::from_millis(50)).await;
        assert_eq!(result.status, MirrorStatus::Offline);
    }

    #[tokio::test]
    async fn refused_connection_is_offline() {
        let probe = HttpProbe::new(true).unwrap();
        let result = probe
            .probe("http://127.0.0.1:9/", Duration::from_secs(1))
            .await;
        assert_eq!(result.status, MirrorStatus::Offline);
    }
}
