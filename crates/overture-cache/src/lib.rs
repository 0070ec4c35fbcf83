//! Verified artifact cache.
//!
//! Layout under the cache root:
//!
//! ```text
//! artifacts/
//!   index.json
//!   .downloads/                   in-flight temp files
//!   php/8.1.27/php-8.1.27.tar.gz
//!   ext-redis/6.0.2/redis-6.0.2.tgz
//!   composer/2.7.1/composer.phar
//! ```
//!
//! Files only enter the cache through [`ArtifactCache::promote`], which renames
//! a completed temp file into place. An interrupted download never leaves a
//! partial file at a cache path.

#![warn(clippy::all)]

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use overture_core::{Artifact, Error, ResourceClass, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, info, warn};

const INDEX_FILE: &str = "index.json";
const DOWNLOADS_DIR: &str = ".downloads";

/// Metadata for one cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactCacheEntry {
    /// Resource class.
    pub resource_class: ResourceClass,
    /// Artifact version.
    pub version: String,
    /// File name.
    pub file_name: String,
    /// Path relative to the cache root.
    pub relative_path: String,
    /// Bytes on disk.
    pub size: u64,
    /// SHA-256 of the file, hex encoded.
    pub sha256: String,
    /// Whether the file passed checksum verification.
    pub verified_signature: bool,
    /// When the file was cached.
    pub cached_at: DateTime<Utc>,
    /// Absolute path, filled in on load.
    #[serde(skip)]
    pub path: PathBuf,
}

/// Selective clearing scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    /// Everything, including in-flight downloads.
    All,
    /// PHP tarballs and binaries.
    Versions,
    /// PECL and per-extension archives.
    Extensions,
    /// Composer phars.
    Composer,
    /// Leftover in-flight temp files only.
    Downloads,
}

impl ClearScope {
    fn matches(self, class: &ResourceClass) -> bool {
        match self {
            Self::All => true,
            Self::Versions => matches!(class, ResourceClass::Php),
            Self::Extensions => class.is_extension(),
            Self::Composer => matches!(class, ResourceClass::Composer),
            Self::Downloads => false,
        }
    }
}

/// Count and size for one class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassStats {
    /// Number of artifacts.
    pub count: usize,
    /// Total bytes.
    pub bytes: u64,
}

/// Aggregate cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of artifacts.
    pub entries: usize,
    /// Total artifact bytes.
    pub total_size: u64,
    /// Per-class breakdown keyed by class key.
    pub by_class: BTreeMap<String, ClassStats>,
    /// Bytes held by leftover in-flight downloads.
    pub downloads_size: u64,
}

/// Result of a clear operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearSummary {
    /// Entries removed from the index.
    pub removed: usize,
    /// Bytes freed.
    pub freed_bytes: u64,
}

/// File-backed cache of verified artifacts.
#[derive(Debug)]
pub struct ArtifactCache {
    root: PathBuf,
    entries: DashMap<String, ArtifactCacheEntry>,
}

impl ArtifactCache {
    /// Open (creating if needed) a cache rooted at `root`.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created or the index is corrupt.
    pub fn at_path(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| Error::io(&root, e))?;
        let cache = Self {
            root,
            entries: DashMap::new(),
        };
        cache.load_index()?;
        Ok(cache)
    }

    /// Cache root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for in-flight downloads, on the same filesystem as the cache.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created.
    pub fn download_dir(&self) -> Result<PathBuf> {
        let dir = self.root.join(DOWNLOADS_DIR);
        std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        Ok(dir)
    }

    /// Look up an artifact. Entries whose file vanished or changed size are dropped.
    #[must_use]
    pub fn get(&self, artifact: &Artifact) -> Option<ArtifactCacheEntry> {
        let key = make_key(artifact);
        let entry = self.entries.get(&key)?.value().clone();
        match std::fs::metadata(&entry.path) {
            Ok(meta) if meta.is_file() && meta.len() == entry.size => {
                debug!(artifact = %artifact, "artifact cache hit");
                Some(entry)
            }
            _ => {
                warn!(path = %entry.path.display(), "cached artifact missing on disk, dropping entry");
                self.entries.remove(&key);
                if let Err(e) = self.save_index() {
                    warn!(error = %e, "failed to persist cache index");
                }
                None
            }
        }
    }

    /// Whether a usable entry exists.
    #[must_use]
    pub fn contains(&self, artifact: &Artifact) -> bool {
        self.get(artifact).is_some()
    }

    /// Move a completed download into the cache.
    ///
    /// The temp file must live under [`download_dir`](Self::download_dir) so
    /// the move is an atomic rename.
    ///
    /// # Errors
    /// Returns error if the file cannot be moved or the index written.
    pub fn promote(
        &self,
        artifact: &Artifact,
        temp: TempPath,
        sha256: &str,
        verified_signature: bool,
    ) -> Result<ArtifactCacheEntry> {
        let relative = format!(
            "{}/{}/{}",
            artifact.class.dir_name(),
            artifact.version,
            artifact.file_name
        );
        let dest = self.root.join(&relative);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        temp.persist(&dest).map_err(|e| Error::io(&dest, e.error))?;
        overture_core::sync_parent_dir(&dest);
        let size = std::fs::metadata(&dest)
            .map_err(|e| Error::io(&dest, e))?
            .len();

        let entry = ArtifactCacheEntry {
            resource_class: artifact.class.clone(),
            version: artifact.version.clone(),
            file_name: artifact.file_name.clone(),
            relative_path: relative,
            size,
            sha256: sha256.to_string(),
            verified_signature,
            cached_at: Utc::now(),
            path: dest,
        };
        self.entries.insert(make_key(artifact), entry.clone());
        self.save_index()?;
        info!(artifact = %artifact, size, verified = verified_signature, "artifact cached");
        Ok(entry)
    }

    /// Remove one artifact.
    ///
    /// # Errors
    /// Returns error if the file cannot be removed.
    pub fn evict(&self, artifact: &Artifact) -> Result<bool> {
        let Some((_, entry)) = self.entries.remove(&make_key(artifact)) else {
            return Ok(false);
        };
        remove_file_if_exists(&entry.path)?;
        self.save_index()?;
        debug!(artifact = %artifact, "artifact evicted");
        Ok(true)
    }

    /// All entries, ordered by class then version.
    #[must_use]
    pub fn entries(&self) -> Vec<ArtifactCacheEntry> {
        let mut out: Vec<ArtifactCacheEntry> =
            self.entries.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| {
            (&a.resource_class, &a.version, &a.file_name).cmp(&(
                &b.resource_class,
                &b.version,
                &b.file_name,
            ))
        });
        out
    }

    /// Remove entries in `scope`.
    ///
    /// # Errors
    /// Returns error if files cannot be removed.
    pub fn clear(&self, scope: ClearScope) -> Result<ClearSummary> {
        let mut summary = ClearSummary::default();
        let doomed: Vec<String> = self
            .entries
            .iter()
            .filter(|e| scope.matches(&e.resource_class))
            .map(|e| e.key().clone())
            .collect();
        for key in doomed {
            if let Some((_, entry)) = self.entries.remove(&key) {
                remove_file_if_exists(&entry.path)?;
                summary.removed += 1;
                summary.freed_bytes += entry.size;
            }
        }
        if matches!(scope, ClearScope::All | ClearScope::Downloads) {
            summary.freed_bytes += self.sweep_downloads()?;
        }
        if summary.removed > 0 {
            self.save_index()?;
        }
        self.prune_empty_dirs();
        info!(?scope, removed = summary.removed, freed = summary.freed_bytes, "cache cleared");
        Ok(summary)
    }

    /// Delete leftover in-flight temp files, returning the bytes freed.
    ///
    /// # Errors
    /// Returns error if a file cannot be removed.
    pub fn sweep_downloads(&self) -> Result<u64> {
        let dir = self.root.join(DOWNLOADS_DIR);
        if !dir.exists() {
            return Ok(0);
        }
        let mut freed = 0;
        for entry in walkdir::WalkDir::new(&dir).min_depth(1) {
            let entry = entry.map_err(|e| Error::io(&dir, e.into()))?;
            if entry.file_type().is_file() {
                freed += entry.metadata().map(|m| m.len()).unwrap_or(0);
                remove_file_if_exists(entry.path())?;
            }
        }
        Ok(freed)
    }

    /// Aggregate statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for entry in &self.entries {
            stats.entries += 1;
            stats.total_size += entry.size;
            let class = stats.by_class.entry(entry.resource_class.key()).or_default();
            class.count += 1;
            class.bytes += entry.size;
        }
        stats.downloads_size = walkdir::WalkDir::new(self.root.join(DOWNLOADS_DIR))
            .min_depth(1)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum();
        stats
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn load_index(&self) -> Result<()> {
        let Some(entries): Option<Vec<ArtifactCacheEntry>> =
            overture_core::read_json_file(&self.index_path())?
        else {
            return Ok(());
        };
        for mut entry in entries {
            entry.path = self.root.join(&entry.relative_path);
            let key = format!(
                "{}:{}:{}",
                entry.resource_class, entry.version, entry.file_name
            );
            self.entries.insert(key, entry);
        }
        debug!(entries = self.entries.len(), "loaded artifact index");
        Ok(())
    }

    fn save_index(&self) -> Result<()> {
        overture_core::write_json_file(&self.index_path(), &self.entries())
    }

    fn prune_empty_dirs(&self) {
        let dirs: Vec<PathBuf> = walkdir::WalkDir::new(&self.root)
            .min_depth(1)
            .contents_first(true)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_dir())
            .map(walkdir::DirEntry::into_path)
            .filter(|p| !p.ends_with(DOWNLOADS_DIR))
            .collect();
        for dir in dirs {
            // only succeeds when empty
            let _ = std::fs::remove_dir(dir);
        }
    }
}

fn make_key(artifact: &Artifact) -> String {
    format!(
        "{}:{}:{}",
        artifact.class, artifact.version, artifact.file_name
    )
}

fn remove_file_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overture_core::PhpVersion;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::io::Write;

    fn temp_download(cache: &ArtifactCache, bytes: &[u8]) -> TempPath {
        let mut f = tempfile::NamedTempFile::new_in(cache.download_dir().unwrap()).unwrap();
        f.write_all(bytes).unwrap();
        f.into_temp_path()
    }

    fn php(v: &str) -> Artifact {
        Artifact::php_source(&PhpVersion::parse(v).unwrap())
    }

    #[test]
    fn promote_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::at_path(dir.path()).unwrap();
        let artifact = php("8.1.27");
        let tmp = temp_download(&cache, b"tarball");

        let entry = cache.promote(&artifact, tmp, "abc123", true).unwrap();
        assert!(entry.path.ends_with("php/8.1.27/php-8.1.27.tar.gz"));
        assert_eq!(std::fs::read(&entry.path).unwrap(), b"tarball");

        let reopened = ArtifactCache::at_path(dir.path()).unwrap();
        let hit = reopened.get(&artifact).unwrap();
        assert_eq!(hit, entry);
        assert!(hit.verified_signature);
    }

    #[test]
    fn vanished_file_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::at_path(dir.path()).unwrap();
        let artifact = php("8.2.0");
        let entry = cache
            .promote(&artifact, temp_download(&cache, b"x"), "h", true)
            .unwrap();
        std::fs::remove_file(&entry.path).unwrap();
        assert!(cache.get(&artifact).is_none());
        assert_eq!(cache.stats().entries, 0);
    }

    #[rstest]
    #[case(ClearScope::Versions, 2)]
    #[case(ClearScope::Extensions, 2)]
    #[case(ClearScope::Composer, 2)]
    #[case(ClearScope::All, 0)]
    fn selective_clear(#[case] scope: ClearScope, #[case] remaining: usize) {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::at_path(dir.path()).unwrap();
        for artifact in [
            php("8.3.4"),
            Artifact::extension("redis", "6.0.2"),
            Artifact::composer("2.7.1"),
        ] {
            cache
                .promote(&artifact, temp_download(&cache, b"data"), "h", true)
                .unwrap();
        }
        cache.clear(scope).unwrap();
        assert_eq!(cache.entries().len(), remaining);
    }

    #[test]
    fn stats_break_down_by_class() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::at_path(dir.path()).unwrap();
        cache
            .promote(&php("8.1.2"), temp_download(&cache, b"12345"), "h", true)
            .unwrap();
        cache
            .promote(&php("8.1.27"), temp_download(&cache, b"123"), "h", true)
            .unwrap();
        let _leftover = temp_download(&cache, b"partial").keep().unwrap();

        let stats = cache.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.total_size, 8);
        assert_eq!(stats.by_class["php"], ClassStats { count: 2, bytes: 8 });
        assert_eq!(stats.downloads_size, 7);

        let summary = cache.clear(ClearScope::Downloads).unwrap();
        assert_eq!(summary.freed_bytes, 7);
        assert_eq!(cache.stats().entries, 2);
    }

    #[test]
    fn evict_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::at_path(dir.path()).unwrap();
        let artifact = Artifact::composer("2.7.1");
        let entry = cache
            .promote(&artifact, temp_download(&cache, b"phar"), "h", false)
            .unwrap();
        assert!(cache.evict(&artifact).unwrap());
        assert!(!entry.path.exists());
        assert!(!cache.evict(&artifact).unwrap());
    }
}
