//! Artifact fetching across the ranked mirror chain.
//!
//! Order of operations for one fetch:
//!
//! 1. A verified cache entry short-circuits everything (no network).
//! 2. The reference checksum is looked up once, before any transfer.
//! 3. Mirrors are ranked (cached ranking when valid), then the official
//!    upstream is appended when the registry allows it.
//! 4. Each candidate is downloaded (segmented when possible) into a temp file
//!    and checked. Only a matching file is promoted into the cache.

use crate::client::HttpClient;
use crate::config::DownloadConfig;
use crate::error::DownloadError;
use crate::progress::{DownloadProgress, ProgressTracker};
use crate::retry::{RetryConfig, with_retry};
use crate::segmented::SegmentedDownloader;
use crate::signature::SignatureVerifier;
use crate::stream::{DownloadedFile, StreamDownloader};
use overture_cache::{ArtifactCache, ArtifactCacheEntry};
use overture_core::{Artifact, Error, FailedAttempt, ResourceClass, Result};
use overture_mirror::{MirrorRegistry, MirrorSpeedRanker};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// One fetch request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// What to fetch.
    pub artifact: Artifact,
    /// Ignore any cached copy.
    pub force_refresh: bool,
    /// Consult the cache at all.
    pub use_cache: bool,
    /// Override the configured multi-thread setting.
    pub multi_thread: Option<bool>,
    /// Override the configured segment count.
    pub threads: Option<u32>,
    /// Require a matching reference checksum.
    pub verify_signature: bool,
}

impl FetchRequest {
    /// Cached, verified fetch with configured threading.
    #[must_use]
    pub const fn new(artifact: Artifact) -> Self {
        Self {
            artifact,
            force_refresh: false,
            use_cache: true,
            multi_thread: None,
            threads: None,
            verify_signature: true,
        }
    }

    /// Skip the cache lookup.
    #[must_use]
    pub const fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    /// Enable or disable cache lookups.
    #[must_use]
    pub const fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Override threading.
    #[must_use]
    pub const fn threading(mut self, multi_thread: bool, threads: u32) -> Self {
        self.multi_thread = Some(multi_thread);
        self.threads = Some(threads);
        self
    }

    /// Enable or disable verification.
    #[must_use]
    pub const fn verify_signature(mut self, verify: bool) -> Self {
        self.verify_signature = verify;
        self
    }
}

/// Progress notifications emitted during a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchEvent {
    /// Served from the cache.
    CacheHit {
        /// Cached file.
        path: std::path::PathBuf,
    },
    /// Starting a candidate.
    Attempt {
        /// Full artifact URL.
        url: String,
        /// 1-based position in the chain.
        position: usize,
        /// Chain length.
        total: usize,
    },
    /// A candidate failed to transfer.
    Failed {
        /// Full artifact URL.
        url: String,
        /// Failure description.
        reason: String,
    },
    /// Bytes arrived; verification follows.
    Downloaded {
        /// Full artifact URL.
        url: String,
        /// Size in bytes.
        size: u64,
        /// Segments used.
        segments: usize,
    },
    /// Checksum matched.
    Verified {
        /// Full artifact URL.
        url: String,
    },
    /// Checksum did not match; the file was discarded.
    Rejected {
        /// Full artifact URL.
        url: String,
        /// Reference digest.
        expected: String,
        /// Computed digest.
        actual: String,
    },
}

/// Fetches artifacts into the [`ArtifactCache`].
#[derive(Clone)]
pub struct DownloadManager {
    config: Arc<DownloadConfig>,
    client: HttpClient,
    stream: StreamDownloader,
    segmented: SegmentedDownloader,
    cache: Arc<ArtifactCache>,
    ranker: Option<MirrorSpeedRanker>,
    verifier: Option<SignatureVerifier>,
    progress: ProgressTracker,
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("config", &self.config)
            .field("cache", &self.cache.root())
            .field("ranker", &self.ranker.is_some())
            .field("verifier", &self.verifier)
            .finish()
    }
}

impl DownloadManager {
    /// Create a manager writing into `cache`.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: DownloadConfig, cache: Arc<ArtifactCache>) -> Result<Self> {
        let client = HttpClient::new(config)?;
        Ok(Self {
            config: Arc::clone(client.config()),
            stream: StreamDownloader::new(client.clone()),
            segmented: SegmentedDownloader::new(client.clone()),
            client,
            cache,
            ranker: None,
            verifier: None,
            progress: ProgressTracker::disabled(),
        })
    }

    /// Order mirrors by measured speed.
    #[must_use]
    pub fn with_ranker(mut self, ranker: MirrorSpeedRanker) -> Self {
        self.ranker = Some(ranker);
        self
    }

    /// Verify downloads with `verifier`.
    #[must_use]
    pub fn with_verifier(mut self, verifier: SignatureVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Show progress bars through `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = progress;
        self
    }

    /// The HTTP client, for reference sources and catalogs sharing its pool.
    #[must_use]
    pub const fn client(&self) -> &HttpClient {
        &self.client
    }

    /// The artifact cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<ArtifactCache> {
        &self.cache
    }

    /// Fetch without observing events.
    ///
    /// # Errors
    /// See [`fetch_with`](Self::fetch_with).
    pub async fn fetch(
        &self,
        mirrors: &MirrorRegistry,
        request: &FetchRequest,
    ) -> Result<ArtifactCacheEntry> {
        self.fetch_with(mirrors, request, |_| {}).await
    }

    /// Fetch `request.artifact`, reporting each step to `on_event`.
    ///
    /// # Errors
    /// - `ReferenceUnavailable` when verification is requested but no
    ///   reference digest exists (no download is attempted).
    /// - `SignatureMismatch` when the last candidate, or too many candidates,
    ///   served bytes that did not match.
    /// - `DownloadExhausted` when every candidate failed to transfer.
    pub async fn fetch_with(
        &self,
        mirrors: &MirrorRegistry,
        request: &FetchRequest,
        mut on_event: impl FnMut(FetchEvent),
    ) -> Result<ArtifactCacheEntry> {
        let artifact = &request.artifact;

        if request.use_cache && !request.force_refresh {
            if let Some(entry) = self.cache.get(artifact) {
                if entry.verified_signature || !request.verify_signature {
                    info!(artifact = %artifact, "using cached artifact");
                    on_event(FetchEvent::CacheHit {
                        path: entry.path.clone(),
                    });
                    return Ok(entry);
                }
                debug!(artifact = %artifact, "cached artifact is unverified, refetching");
            }
        }

        let reference = if request.verify_signature {
            let verifier = self.verifier.as_ref().ok_or_else(|| Error::ReferenceUnavailable {
                artifact: artifact.to_string(),
                reason: "no checksum sources are configured".to_string(),
            })?;
            Some(verifier.reference_for(artifact).await?)
        } else {
            None
        };

        let chain = self.candidate_chain(mirrors, &artifact.class).await;
        let dir = self.cache.download_dir()?;
        let mut attempted: Vec<FailedAttempt> = Vec::new();
        let mut verification_failures = 0u32;
        let max_failures = self.config.max_verification_failures.max(1);

        for (i, base) in chain.iter().enumerate() {
            let is_last = i + 1 == chain.len();
            let url = match artifact.url_on(base) {
                Ok(url) => url,
                Err(e) => {
                    warn!(base = %base, error = %e, "skipping unusable mirror");
                    attempted.push(FailedAttempt {
                        url: base.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            on_event(FetchEvent::Attempt {
                url: url.to_string(),
                position: i + 1,
                total: chain.len(),
            });
            debug!(url = %url, position = i + 1, total = chain.len(), "trying candidate");

            let file = match self.download_candidate(&url, request, &dir).await {
                Ok(file) => file,
                Err(e) => {
                    warn!(url = %url, error = %e, "candidate failed");
                    on_event(FetchEvent::Failed {
                        url: url.to_string(),
                        reason: e.to_string(),
                    });
                    attempted.push(FailedAttempt {
                        url: url.to_string(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            on_event(FetchEvent::Downloaded {
                url: url.to_string(),
                size: file.size,
                segments: file.segments,
            });

            let actual = file.checksums.sha256_hex();
            match &reference {
                Some(reference) if !reference.matches(&actual) => {
                    verification_failures += 1;
                    warn!(
                        url = %url,
                        expected = %reference.sha256,
                        actual = %actual,
                        "checksum mismatch, discarding download"
                    );
                    on_event(FetchEvent::Rejected {
                        url: url.to_string(),
                        expected: reference.sha256.clone(),
                        actual: actual.clone(),
                    });
                    attempted.push(FailedAttempt {
                        url: url.to_string(),
                        reason: format!("checksum mismatch (expected {}, got {actual})", reference.sha256),
                    });
                    drop(file);
                    if is_last || verification_failures >= max_failures {
                        return Err(Error::SignatureMismatch {
                            artifact: artifact.to_string(),
                            expected: reference.sha256.clone(),
                            actual,
                            attempted,
                        });
                    }
                }
                Some(_) => {
                    on_event(FetchEvent::Verified {
                        url: url.to_string(),
                    });
                    return self.promote(artifact, file, &actual, true);
                }
                None => return self.promote(artifact, file, &actual, false),
            }
        }

        Err(Error::DownloadExhausted {
            artifact: artifact.to_string(),
            attempted,
        })
    }

    /// Ranked mirrors followed by the official upstream when allowed.
    ///
    /// Ranking failures fall back to configured order.
    pub async fn candidate_chain(
        &self,
        mirrors: &MirrorRegistry,
        class: &ResourceClass,
    ) -> Vec<String> {
        let configured = mirrors.mirror_urls(class);
        let mut chain = match &self.ranker {
            Some(ranker) if configured.len() > 1 => {
                match ranker.get_cached_or_rank(&configured).await {
                    Ok(ranked) => {
                        let mut ordered: Vec<String> = ranked.into_iter().map(|r| r.url).collect();
                        let seen: HashSet<String> = ordered.iter().cloned().collect();
                        ordered.extend(configured.into_iter().filter(|u| !seen.contains(u)));
                        ordered
                    }
                    Err(e) => {
                        warn!(error = %e, "mirror ranking failed, using configured order");
                        configured
                    }
                }
            }
            _ => configured,
        };
        chain.extend(mirrors.official_fallback(class));
        debug!(class = %class, chain = ?chain, "candidate chain");
        chain
    }

    async fn download_candidate(
        &self,
        url: &Url,
        request: &FetchRequest,
        dir: &Path,
    ) -> std::result::Result<DownloadedFile, DownloadError> {
        let threads = request.threads.unwrap_or(self.config.threads).max(1) as usize;
        let multi = request.multi_thread.unwrap_or(self.config.multi_thread) && threads > 1;
        let retry = RetryConfig::for_requests(&self.config);
        let progress = self.progress.start(&request.artifact.file_name);

        let result = self
            .transfer(url, multi, threads, &retry, dir, &progress)
            .await;
        match &result {
            Ok(_) => progress.finish(),
            Err(_) => progress.abandon(),
        }
        result
    }

    async fn transfer(
        &self,
        url: &Url,
        multi: bool,
        threads: usize,
        retry: &RetryConfig,
        dir: &Path,
        progress: &DownloadProgress,
    ) -> std::result::Result<DownloadedFile, DownloadError> {
        if multi {
            let total = with_retry(retry, move || self.client.probe_range(url)).await?;
            match total {
                Some(total) if total > 0 => {
                    match self
                        .segmented
                        .download(url, total, threads, dir, progress)
                        .await
                    {
                        Err(DownloadError::RangeNotSupported { .. }) => {
                            debug!(url = %url, "segments refused, degrading to single stream");
                            progress.rewind(progress.bytes());
                        }
                        other => return other,
                    }
                }
                _ => debug!(url = %url, "range requests unsupported, using single stream"),
            }
        }
        with_retry(retry, move || self.stream.download(url, dir, progress)).await
    }

    fn promote(
        &self,
        artifact: &Artifact,
        file: DownloadedFile,
        sha256: &str,
        verified: bool,
    ) -> Result<ArtifactCacheEntry> {
        let source = file.url.to_string();
        let entry = self.cache.promote(artifact, file.temp, sha256, verified)?;
        info!(artifact = %artifact, source = %source, verified, "artifact fetched");
        Ok(entry)
    }
}

