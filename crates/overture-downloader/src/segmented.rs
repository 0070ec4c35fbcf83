//! Multi-connection downloads over byte ranges.
//!
//! The content is split into contiguous segments, each fetched into its own
//! part file. Parts are concatenated in offset order into a fresh temp file
//! once every segment has arrived, so a failure never leaves merged bytes
//! behind.

use crate::checksum::MultiHasher;
use crate::client::HttpClient;
use crate::error::{DownloadError, Result};
use crate::progress::DownloadProgress;
use crate::retry::{RetryConfig, with_retry};
use crate::stream::{DownloadedFile, create_temp};
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::StatusCode;
use std::path::Path;
use std::time::Duration;
use tempfile::TempPath;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, trace, warn};
use url::Url;

/// One contiguous byte range, `end` inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Position in the file.
    pub index: usize,
    /// First byte offset.
    pub start: u64,
    /// Last byte offset.
    pub end: u64,
}

impl Segment {
    /// Number of bytes in the segment.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Segments are never empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }
}

/// Split `total` bytes into at most `parts` contiguous segments.
///
/// Earlier segments absorb the remainder, so sizes differ by at most one byte.
/// Returns an empty plan for an empty body.
#[must_use]
pub fn plan_segments(total: u64, parts: usize) -> Vec<Segment> {
    if total == 0 {
        return Vec::new();
    }
    let parts = (parts.max(1) as u64).min(total);
    let base = total / parts;
    let remainder = total % parts;
    let mut start = 0;
    (0..parts)
        .map(|i| {
            let len = base + u64::from(i < remainder);
            let segment = Segment {
                index: i as usize,
                start,
                end: start + len - 1,
            };
            start += len;
            segment
        })
        .collect()
}

/// Concurrent range downloader.
#[derive(Debug, Clone)]
pub struct SegmentedDownloader {
    client: HttpClient,
    retry: RetryConfig,
    segment_timeout: Duration,
    buffer_size: usize,
}

impl SegmentedDownloader {
    /// Create a segmented downloader using the client's configuration.
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        let config = client.config();
        Self {
            retry: RetryConfig::for_segments(config),
            segment_timeout: config.segment_timeout,
            buffer_size: config.buffer_size,
            client,
        }
    }

    /// Download `total` bytes of `url` with `threads` concurrent segments.
    ///
    /// # Errors
    /// Returns `SegmentFailed` when a segment exhausts its retries, or
    /// `RangeNotSupported` when the server answers a segment without a partial
    /// response. Every part file is removed in both cases.
    pub async fn download(
        &self,
        url: &Url,
        total: u64,
        threads: usize,
        dir: &Path,
        progress: &DownloadProgress,
    ) -> Result<DownloadedFile> {
        let plan = plan_segments(total, threads);
        if plan.is_empty() {
            return Err(DownloadError::RangeNotSupported {
                url: url.to_string(),
            });
        }
        progress.set_total(total);
        debug!(url = %url, total, segments = plan.len(), "segmented download");

        let mut parts: Vec<(usize, TempPath)> = stream::iter(plan.iter().copied())
            .map(|segment| self.fetch_segment(url, segment, dir, progress))
            .buffer_unordered(plan.len())
            .try_collect()
            .await?;
        parts.sort_by_key(|(index, _)| *index);

        let file = self.assemble(url, &parts, dir).await?;
        if file.size != total {
            return Err(DownloadError::LengthMismatch {
                url: url.to_string(),
                expected: total,
                actual: file.size,
            });
        }
        info!(url = %url, size = total, segments = plan.len(), "segments reassembled");
        Ok(DownloadedFile {
            segments: plan.len(),
            ..file
        })
    }

    async fn fetch_segment(
        &self,
        url: &Url,
        segment: Segment,
        dir: &Path,
        progress: &DownloadProgress,
    ) -> Result<(usize, TempPath)> {
        let result = with_retry(&self.retry, move || async move {
            match tokio::time::timeout(
                self.segment_timeout,
                self.fetch_segment_once(url, segment, dir, progress),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(DownloadError::Timeout {
                    url: url.to_string(),
                    duration: self.segment_timeout,
                }),
            }
        })
        .await;

        result
            .map(|path| (segment.index, path))
            .map_err(|e| match e {
                DownloadError::RangeNotSupported { .. } => {
                    debug!(url = %url, index = segment.index, "segment range refused");
                    e
                }
                e => {
                    warn!(url = %url, index = segment.index, error = %e, "segment failed");
                    DownloadError::SegmentFailed {
                        index: segment.index,
                        start: segment.start,
                        end: segment.end,
                        message: e.to_string(),
                    }
                }
            })
    }

    async fn fetch_segment_once(
        &self,
        url: &Url,
        segment: Segment,
        dir: &Path,
        progress: &DownloadProgress,
    ) -> Result<TempPath> {
        let response = self.client.get_range(url, segment.start, segment.end).await?;
        if response.status() != StatusCode::PARTIAL_CONTENT {
            return Err(DownloadError::RangeNotSupported {
                url: url.to_string(),
            });
        }

        let (mut file, temp) = create_temp(dir, &format!(".seg{}-", segment.index))?;
        let mut body = response.bytes_stream();
        let mut received = 0u64;

        let outcome: Result<()> = async {
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(DownloadError::from_reqwest)?;
                received += chunk.len() as u64;
                if received > segment.len() {
                    break;
                }
                file.write_all(&chunk)
                    .await
                    .map_err(|e| DownloadError::io(&*temp, e))?;
                progress.inc(chunk.len() as u64);
            }
            file.flush().await.map_err(|e| DownloadError::io(&*temp, e))?;
            Ok(())
        }
        .await;

        if let Err(e) = outcome {
            progress.rewind(received.min(segment.len()));
            return Err(e);
        }
        if received != segment.len() {
            progress.rewind(received.min(segment.len()));
            return Err(DownloadError::LengthMismatch {
                url: url.to_string(),
                expected: segment.len(),
                actual: received,
            });
        }
        trace!(index = segment.index, bytes = received, "segment complete");
        Ok(temp)
    }

    async fn assemble(
        &self,
        url: &Url,
        parts: &[(usize, TempPath)],
        dir: &Path,
    ) -> Result<DownloadedFile> {
        let (mut out, temp) = create_temp(dir, ".assembled-")?;
        let mut hasher = MultiHasher::new();
        let mut size = 0u64;
        let mut buf = vec![0u8; self.buffer_size.max(4096)];

        for (_, part) in parts {
            let mut reader = tokio::fs::File::open(&**part)
                .await
                .map_err(|e| DownloadError::io(&**part, e))?;
            loop {
                let n = reader
                    .read(&mut buf)
                    .await
                    .map_err(|e| DownloadError::io(&**part, e))?;
                if n == 0 {
                    break;
                }
                out.write_all(&buf[..n])
                    .await
                    .map_err(|e| DownloadError::io(&*temp, e))?;
                hasher.update(&buf[..n]);
                size += n as u64;
            }
        }
        out.flush().await.map_err(|e| DownloadError::io(&*temp, e))?;
        out.sync_all()
            .await
            .map_err(|e| DownloadError::io(&*temp, e))?;

        Ok(DownloadedFile {
            temp,
            size,
            checksums: hasher.finalize(),
            url: url.clone(),
            segments: parts.len(),
        })
    }
}
