//! Artifact downloading for Overture.
//!
//! This crate fetches PHP source tarballs, prebuilt binaries, PECL archives and
//! Composer phars with:
//!
//! - **Mirror chains** ranked by measured latency, then the official upstream
//! - **Segmented downloads** over HTTP byte ranges, reassembled in order
//! - **Bounded retries** with exponential backoff per candidate and per segment
//! - **Checksum verification** against published or pinned SHA-256 digests
//! - **Atomic promotion** into the artifact cache, never a partial file
//! - **Streaming extraction** for tar.gz, tar.xz, tar.bz2 and ZIP
//!
//! # Example
//!
//! ```no_run
//! use overture_cache::ArtifactCache;
//! use overture_core::{Artifact, PhpVersion};
//! use overture_downloader::{DownloadConfig, DownloadManager, FetchRequest};
//! use overture_mirror::MirrorRegistry;
//! use std::sync::Arc;
//!
//! # async fn example() -> overture_core::Result<()> {
//! let cache = Arc::new(ArtifactCache::at_path("/tmp/overture/cache/artifacts")?);
//! let mirrors = MirrorRegistry::load("/tmp/overture/mirrors.json")?;
//! let manager = DownloadManager::new(DownloadConfig::default(), cache)?;
//!
//! let artifact = Artifact::php_source(&PhpVersion::parse("8.3.4")?);
//! let request = FetchRequest::new(artifact).verify_signature(false);
//! let entry = manager.fetch(&mirrors, &request).await?;
//! println!("cached at {}", entry.path.display());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod checksum;
pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod manager;
pub mod progress;
pub mod retry;
pub mod segmented;
pub mod signature;
pub mod stream;

pub use checksum::{ComputedChecksums, MultiHasher, digests_match, hash_file};
pub use client::HttpClient;
pub use config::{DownloadConfig, DownloadConfigBuilder};
pub use error::{DownloadError, Result};
pub use extract::{ArchiveType, ExtractOptions, ExtractionResult, Extractor};
pub use manager::{DownloadManager, FetchEvent, FetchRequest};
pub use progress::{DownloadProgress, ProgressTracker, format_bytes};
pub use retry::{RetryConfig, with_retry};
pub use segmented::{Segment, SegmentedDownloader, plan_segments};
pub use signature::{
    ComposerChecksums, CompositeReferences, LocalManifest, Reference, ReferenceSource,
    SignatureVerifier, manifest_path,
};
pub use stream::{DownloadedFile, StreamDownloader};
