//! Single-stream download into a temp file.

use crate::checksum::{ComputedChecksums, MultiHasher};
use crate::client::HttpClient;
use crate::error::{DownloadError, Result};
use crate::progress::DownloadProgress;
use futures_util::StreamExt;
use std::path::Path;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};
use url::Url;

/// A complete download waiting for verification.
///
/// The file is deleted when this value is dropped unless it is promoted.
#[derive(Debug)]
pub struct DownloadedFile {
    /// Temp file holding the bytes.
    pub temp: TempPath,
    /// Bytes written.
    pub size: u64,
    /// Digests computed while writing.
    pub checksums: ComputedChecksums,
    /// URL the bytes came from.
    pub url: Url,
    /// Number of segments used (1 for a single stream).
    pub segments: usize,
}

impl DownloadedFile {
    /// Path of the temp file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.temp
    }
}

/// Create a temp file in `dir` and return it as an async file plus its path guard.
pub(crate) fn create_temp(dir: &Path, prefix: &str) -> Result<(tokio::fs::File, TempPath)> {
    let named = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|e| DownloadError::io(dir, e))?;
    let (file, path) = named.into_parts();
    Ok((tokio::fs::File::from_std(file), path))
}

/// Sequential downloader.
#[derive(Debug, Clone)]
pub struct StreamDownloader {
    client: HttpClient,
}

impl StreamDownloader {
    /// Create a new stream downloader.
    #[must_use]
    pub const fn new(client: HttpClient) -> Self {
        Self { client }
    }

    /// Download `url` into a fresh temp file under `dir`.
    ///
    /// # Errors
    /// Returns error if the request fails, the body is cut short, or the file
    /// cannot be written. The temp file is removed on error.
    pub async fn download(
        &self,
        url: &Url,
        dir: &Path,
        progress: &DownloadProgress,
    ) -> Result<DownloadedFile> {
        let response = self.client.get(url).await?;
        let expected = response.content_length();
        if let Some(total) = expected {
            progress.set_total(total);
        }
        debug!(url = %url, size = ?expected, "streaming download");

        let (mut file, temp) = create_temp(dir, ".stream-")?;
        let mut stream = response.bytes_stream();
        let mut hasher = MultiHasher::new();
        let mut written = 0u64;

        let outcome: Result<()> = async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(DownloadError::from_reqwest)?;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| DownloadError::io(&*temp, e))?;
                hasher.update(&chunk);
                written += chunk.len() as u64;
                progress.inc(chunk.len() as u64);
                trace!(bytes = chunk.len(), written, "wrote chunk");
            }
            file.flush().await.map_err(|e| DownloadError::io(&*temp, e))?;
            file.sync_all()
                .await
                .map_err(|e| DownloadError::io(&*temp, e))?;
            Ok(())
        }
        .await;

        if let Err(e) = outcome {
            progress.rewind(written);
            return Err(e);
        }

        if let Some(total) = expected {
            if total != written {
                progress.rewind(written);
                return Err(DownloadError::LengthMismatch {
                    url: url.to_string(),
                    expected: total,
                    actual: written,
                });
            }
        }

        Ok(DownloadedFile {
            temp,
            size: written,
            checksums: hasher.finalize(),
            url: url.clone(),
            segments: 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn downloads_body_and_hashes_it() {
        let server = MockServer::start().await;
        let body: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        Mock::given(method("GET"))
            .and(path("/php-8.3.4.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = StreamDownloader::new(HttpClient::with_defaults().unwrap());
        let url = Url::parse(&format!("{}/php-8.3.4.tar.gz", server.uri())).unwrap();
        let progress = DownloadProgress::hidden();
        let file = downloader.download(&url, dir.path(), &progress).await.unwrap();

        assert_eq!(file.size, body.len() as u64);
        assert_eq!(std::fs::read(file.path()).unwrap(), body);
        let mut expected = MultiHasher::new();
        expected.update(&body);
        assert_eq!(file.checksums, expected.finalize());
        assert_eq!(progress.bytes(), body.len() as u64);
    }

    #[tokio::test]
    async fn temp_file_removed_on_drop_and_on_error() {
        let server = MockServer::start().await;
        Mock::given(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"abc".to_vec()))
            .mount(&server)
            .await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = StreamDownloader::new(HttpClient::with_defaults().unwrap());
        let progress = DownloadProgress::hidden();

        let ok = Url::parse(&format!("{}/ok", server.uri())).unwrap();
        let file = downloader.download(&ok, dir.path(), &progress).await.unwrap();
        drop(file);

        let missing = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        assert!(downloader.download(&missing, dir.path(), &progress).await.is_err());

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
