//! Incremental hashing of downloaded bytes.
//!
//! SHA-256 is the reference algorithm published by php.net and Composer.
//! BLAKE3 is computed alongside it for cheap local identity checks.

use blake3::Hasher as Blake3Hasher;
use digest::Digest;
use sha2::Sha256;
use std::path::Path;
use subtle::ConstantTimeEq;
use tokio::io::AsyncReadExt;

use crate::error::{DownloadError, Result};

/// Hasher fed while bytes are streamed to disk.
#[derive(Debug, Clone, Default)]
pub struct MultiHasher {
    sha256: Sha256,
    blake3: Blake3Hasher,
}

impl MultiHasher {
    /// Create a new hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the hasher with data.
    pub fn update(&mut self, data: &[u8]) {
        self.sha256.update(data);
        self.blake3.update(data);
    }

    /// Finalize both digests.
    #[must_use]
    pub fn finalize(self) -> ComputedChecksums {
        let mut sha256 = [0u8; 32];
        sha256.copy_from_slice(&self.sha256.finalize());
        ComputedChecksums {
            sha256,
            blake3: *self.blake3.finalize().as_bytes(),
        }
    }
}

/// Computed checksums from a finalized hasher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputedChecksums {
    /// SHA-256 digest.
    pub sha256: [u8; 32],
    /// BLAKE3 digest.
    pub blake3: [u8; 32],
}

impl ComputedChecksums {
    /// SHA-256 as lowercase hex.
    #[must_use]
    pub fn sha256_hex(&self) -> String {
        hex::encode(self.sha256)
    }

    /// BLAKE3 as lowercase hex.
    #[must_use]
    pub fn blake3_hex(&self) -> String {
        hex::encode(self.blake3)
    }
}

/// Hash a file on disk.
///
/// # Errors
/// Returns error if the file cannot be read.
pub async fn hash_file(path: &Path) -> Result<ComputedChecksums> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    let mut hasher = MultiHasher::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

/// Compare two hex digests in constant time, ignoring case and surrounding space.
#[must_use]
pub fn digests_match(expected: &str, actual: &str) -> bool {
    let (Ok(expected), Ok(actual)) = (
        hex::decode(expected.trim().to_ascii_lowercase()),
        hex::decode(actual.trim().to_ascii_lowercase()),
    ) else {
        return false;
    };
    expected.len() == actual.len() && bool::from(expected.ct_eq(&actual))
}
