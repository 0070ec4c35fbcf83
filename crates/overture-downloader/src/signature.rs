//! Reference checksums and artifact verification.
//!
//! A mismatch is an ordinary outcome (`Ok(false)`); only the inability to
//! obtain a reference value is an error.

use crate::checksum::{digests_match, hash_file};
use crate::client::HttpClient;
use async_trait::async_trait;
use overture_core::{Artifact, Error, ResourceClass, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Supplies known-good SHA-256 digests.
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    /// Short name for diagnostics.
    fn name(&self) -> &str;

    /// Reference digest for `artifact`, or `None` when this source has no opinion.
    ///
    /// # Errors
    /// Returns error when the source exists but could not be consulted.
    async fn sha256_for(&self, artifact: &Artifact) -> Result<Option<String>>;
}

/// Pinned digests from `checksums.json` in the Overture home.
///
/// The file maps `"<class>:<version>:<file>"` keys to hex digests.
#[derive(Debug, Clone, Default)]
pub struct LocalManifest {
    entries: BTreeMap<String, String>,
}

impl LocalManifest {
    /// Load the manifest; a missing file yields an empty manifest.
    ///
    /// # Errors
    /// Returns error if the file exists but is not valid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let entries: Option<BTreeMap<String, String>> = overture_core::read_json_file(path)?;
        Ok(Self {
            entries: entries.unwrap_or_default(),
        })
    }

    /// Build a manifest in memory.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Manifest key for `artifact`.
    #[must_use]
    pub fn key_for(artifact: &Artifact) -> String {
        format!(
            "{}:{}:{}",
            artifact.class.key(),
            artifact.version,
            artifact.file_name
        )
    }

    /// Record a digest.
    pub fn insert(&mut self, artifact: &Artifact, sha256: impl Into<String>) {
        self.entries.insert(Self::key_for(artifact), sha256.into());
    }

    /// Persist to `path`.
    ///
    /// # Errors
    /// Returns error if the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        overture_core::write_json_file(path, &self.entries)
    }
}

#[async_trait]
impl ReferenceSource for LocalManifest {
    fn name(&self) -> &str {
        "local manifest"
    }

    async fn sha256_for(&self, artifact: &Artifact) -> Result<Option<String>> {
        Ok(self.entries.get(&Self::key_for(artifact)).cloned())
    }
}

/// Composer's published `composer.phar.sha256sum` files.
#[derive(Debug, Clone)]
pub struct ComposerChecksums {
    client: HttpClient,
    base: String,
}

impl ComposerChecksums {
    /// Read digests from `base` (normally the official Composer download host).
    #[must_use]
    pub fn new(client: HttpClient, base: impl Into<String>) -> Self {
        Self {
            client,
            base: base.into(),
        }
    }
}

#[async_trait]
impl ReferenceSource for ComposerChecksums {
    fn name(&self) -> &str {
        "getcomposer.org"
    }

    async fn sha256_for(&self, artifact: &Artifact) -> Result<Option<String>> {
        if artifact.class != ResourceClass::Composer {
            return Ok(None);
        }
        let url = Url::parse(&format!(
            "{}/{}.sha256sum",
            self.base.trim_end_matches('/'),
            artifact.relative_path
        ))
        .map_err(|e| Error::network(e.to_string(), None))?;
        let response = match self.client.get(&url).await {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let body = response
            .text()
            .await
            .map_err(|e| Error::network(e.to_string(), Some(url.to_string())))?;
        Ok(body.split_whitespace().next().map(str::to_ascii_lowercase))
    }
}

/// Tries several sources in order; the first answer wins.
#[derive(Clone, Default)]
pub struct CompositeReferences {
    sources: Vec<Arc<dyn ReferenceSource>>,
}

impl std::fmt::Debug for CompositeReferences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.sources.iter().map(|s| s.name()))
            .finish()
    }
}

impl CompositeReferences {
    /// Empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source.
    #[must_use]
    pub fn with(mut self, source: Arc<dyn ReferenceSource>) -> Self {
        self.sources.push(source);
        self
    }
}

#[async_trait]
impl ReferenceSource for CompositeReferences {
    fn name(&self) -> &str {
        "composite"
    }

    async fn sha256_for(&self, artifact: &Artifact) -> Result<Option<String>> {
        let mut last_error = None;
        for source in &self.sources {
            match source.sha256_for(artifact).await {
                Ok(Some(digest)) => {
                    debug!(artifact = %artifact, source = source.name(), "reference checksum found");
                    return Ok(Some(digest));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(artifact = %artifact, source = source.name(), error = %e, "reference source failed");
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

/// Reference lookup result kept for the duration of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Expected digest, lowercase hex.
    pub sha256: String,
    /// Source that supplied it.
    pub source: String,
}

impl Reference {
    /// Whether `actual` matches, compared in constant time.
    #[must_use]
    pub fn matches(&self, actual: &str) -> bool {
        digests_match(&self.sha256, actual)
    }
}

/// Validates downloaded artifacts against reference digests.
#[derive(Clone)]
pub struct SignatureVerifier {
    references: Arc<dyn ReferenceSource>,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("references", &self.references.name())
            .finish()
    }
}

impl SignatureVerifier {
    /// Verify against `references`.
    #[must_use]
    pub fn new(references: Arc<dyn ReferenceSource>) -> Self {
        Self { references }
    }

    /// Look up the reference digest for `artifact`.
    ///
    /// # Errors
    /// Returns `ReferenceUnavailable` when no source knows the artifact or a
    /// source could not be consulted.
    pub async fn reference_for(&self, artifact: &Artifact) -> Result<Reference> {
        match self.references.sha256_for(artifact).await {
            Ok(Some(sha256)) => Ok(Reference {
                sha256: sha256.trim().to_ascii_lowercase(),
                source: self.references.name().to_string(),
            }),
            Ok(None) => Err(Error::ReferenceUnavailable {
                artifact: artifact.to_string(),
                reason: "no published checksum is known for this artifact".to_string(),
            }),
            Err(e) => Err(Error::ReferenceUnavailable {
                artifact: artifact.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Check the file at `path` against the reference for `artifact`.
    ///
    /// Returns `Ok(false)` on mismatch.
    ///
    /// # Errors
    /// Returns `ReferenceUnavailable` if no reference can be obtained, or an
    /// IO error if the file cannot be read.
    pub async fn verify(&self, path: &Path, artifact: &Artifact) -> Result<bool> {
        let reference = self.reference_for(artifact).await?;
        let actual = hash_file(path).await.map_err(Error::from)?;
        let ok = reference.matches(&actual.sha256_hex());
        if !ok {
            warn!(
                artifact = %artifact,
                expected = %reference.sha256,
                actual = %actual.sha256_hex(),
                "checksum mismatch"
            );
        }
        Ok(ok)
    }
}

/// Path of the pinned manifest under `home`.
#[must_use]
pub fn manifest_path(home: &Path) -> PathBuf {
    home.join("checksums.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn ext() -> Artifact {
        Artifact::extension("redis", "6.0.2")
    }

    #[tokio::test]
    async fn verify_distinguishes_match_and_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("redis-6.0.2.tgz");
        std::fs::write(&file, b"hello").unwrap();

        let mut manifest = LocalManifest::default();
        manifest.insert(&ext(), HELLO_SHA256.to_uppercase());
        let verifier = SignatureVerifier::new(Arc::new(manifest));
        assert!(verifier.verify(&file, &ext()).await.unwrap());

        std::fs::write(&file, b"hellO").unwrap();
        assert!(!verifier.verify(&file, &ext()).await.unwrap());
    }

    #[tokio::test]
    async fn missing_reference_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"hello").unwrap();
        let verifier = SignatureVerifier::new(Arc::new(LocalManifest::default()));
        let err = verifier.verify(&file, &ext()).await.unwrap_err();
        assert!(matches!(err, Error::ReferenceUnavailable { .. }));
    }

    #[tokio::test]
    async fn manifest_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = manifest_path(dir.path());
        let mut manifest = LocalManifest::load(&path).unwrap();
        manifest.insert(&ext(), HELLO_SHA256);
        manifest.save(&path).unwrap();
        let loaded = LocalManifest::load(&path).unwrap();
        assert_eq!(
            loaded.sha256_for(&ext()).await.unwrap().as_deref(),
            Some(HELLO_SHA256)
        );
    }

    #[tokio::test]
    async fn composer_sums_are_parsed() {
        let server = MockServer::start().await;
        Mock::given(path("/2.7.1/composer.phar.sha256sum"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(format!("{HELLO_SHA256}  composer.phar\n")),
            )
            .mount(&server)
            .await;
        let source = ComposerChecksums::new(HttpClient::with_defaults().unwrap(), server.uri());
        let digest = source.sha256_for(&Artifact::composer("2.7.1")).await.unwrap();
        assert_eq!(digest.as_deref(), Some(HELLO_SHA256));
        assert_eq!(source.sha256_for(&ext()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn composite_uses_first_answer() {
        let mut pinned = LocalManifest::default();
        pinned.insert(&ext(), "aa");
        let mut other = LocalManifest::default();
        other.insert(&ext(), "bb");
        let composite = CompositeReferences::new()
            .with(Arc::new(LocalManifest::default()))
            .with(Arc::new(pinned))
            .with(Arc::new(other));
        assert_eq!(
            composite.sha256_for(&ext()).await.unwrap().as_deref(),
            Some("aa")
        );
    }
}
