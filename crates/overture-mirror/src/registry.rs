//! Persisted mirror configuration.
//!
//! One record per resource class (and per-extension override), each with a
//! primary and an ordered list of fallbacks, plus global toggles. A class
//! without a configured primary uses its official upstream as primary.
//!
//! The registry is an owned value: load it at the start of an operation,
//! mutate it, then [`save`](MirrorRegistry::save) it. Concurrent CLI processes
//! race last-writer-wins.

use crate::OfficialUpstreams;
use overture_core::{Error, ResourceClass, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

/// Global mirror toggles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorSettings {
    /// When false every lookup bypasses mirrors and uses the official upstream.
    pub enabled: bool,
    /// Per-request timeout for mirror traffic.
    pub timeout_secs: u64,
    /// Verify TLS certificates.
    pub verify_ssl: bool,
    /// Append the official upstream after all mirrors.
    pub auto_fallback: bool,
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 30,
            verify_ssl: true,
            auto_fallback: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct MirrorRecord {
    name: String,
    url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct ClassMirrors {
    #[serde(default)]
    primary: Option<MirrorRecord>,
    #[serde(default)]
    fallbacks: Vec<MirrorRecord>,
}

impl ClassMirrors {
    fn contains_name(&self, name: &str) -> bool {
        self.primary.as_ref().is_some_and(|p| p.name == name)
            || self.fallbacks.iter().any(|f| f.name == name)
    }

    fn unique_name(&self, url: &Url) -> String {
        let base = url.host_str().unwrap_or("mirror").to_string();
        if !self.contains_name(&base) {
            return base;
        }
        (2..)
            .map(|n| format!("{base}-{n}"))
            .find(|candidate| !self.contains_name(candidate))
            .unwrap_or(base)
    }

    fn is_empty(&self) -> bool {
        self.primary.is_none() && self.fallbacks.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    settings: MirrorSettings,
    #[serde(default)]
    classes: BTreeMap<String, ClassMirrors>,
}

/// One mirror as presented to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorEntry {
    /// Class the mirror serves.
    pub resource_class: ResourceClass,
    /// Name, unique within the class.
    pub name: String,
    /// Base URL.
    pub url: String,
    /// Whether this is the class primary.
    pub is_primary: bool,
    /// Whether this is the built-in official upstream.
    pub is_official: bool,
}

/// Validate a mirror URL (scheme `http`/`https` and a host) and normalize it.
///
/// # Errors
/// Returns [`Error::InvalidMirrorUrl`] when the URL is unusable.
pub fn validate_mirror_url(raw: &str) -> Result<Url> {
    let invalid = |reason: &str| Error::InvalidMirrorUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };
    let url = Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(url)
}

fn normalize(url: &Url) -> String {
    url.as_str().trim_end_matches('/').to_string()
}

fn same_url(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

/// Persisted mirror registry.
#[derive(Debug, Clone)]
pub struct MirrorRegistry {
    path: PathBuf,
    file: RegistryFile,
    official: OfficialUpstreams,
}

impl MirrorRegistry {
    /// Load from `path`; a missing file yields defaults.
    ///
    /// # Errors
    /// Returns error if the file exists but is unreadable or corrupt.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = overture_core::read_json_file(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            file,
            official: OfficialUpstreams::default(),
        })
    }

    /// Replace the official upstreams.
    #[must_use]
    pub fn with_official(mut self, official: OfficialUpstreams) -> Self {
        self.official = official;
        self
    }

    /// Persist atomically.
    ///
    /// # Errors
    /// Returns error if the write fails.
    pub fn save(&self) -> Result<()> {
        overture_core::write_json_file(&self.path, &self.file)?;
        debug!(path = %self.path.display(), "mirror registry saved");
        Ok(())
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Official upstreams in use.
    #[must_use]
    pub const fn official(&self) -> &OfficialUpstreams {
        &self.official
    }

    /// Global toggles.
    #[must_use]
    pub const fn settings(&self) -> &MirrorSettings {
        &self.file.settings
    }

    /// Whether mirrors are consulted at all.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.file.settings.enabled
    }

    /// Turn mirror resolution on.
    pub fn enable(&mut self) {
        self.file.settings.enabled = true;
    }

    /// Turn mirror resolution off; lookups go straight to official upstreams.
    pub fn disable(&mut self) {
        self.file.settings.enabled = false;
    }

    /// Set the request timeout.
    ///
    /// # Errors
    /// Returns [`Error::InvalidOption`] for zero.
    pub fn set_timeout(&mut self, secs: u64) -> Result<()> {
        if secs == 0 {
            return Err(Error::invalid_option("timeout", "must be at least 1 second"));
        }
        self.file.settings.timeout_secs = secs;
        Ok(())
    }

    /// Toggle TLS verification.
    pub fn set_verify_ssl(&mut self, verify: bool) {
        self.file.settings.verify_ssl = verify;
    }

    /// Toggle the official fallback.
    pub fn set_auto_fallback(&mut self, enabled: bool) {
        self.file.settings.auto_fallback = enabled;
    }

    /// Whether `class` has a record of its own.
    #[must_use]
    pub fn has_record(&self, class: &ResourceClass) -> bool {
        self.file
            .classes
            .get(&class.key())
            .is_some_and(|r| !r.is_empty())
    }

    /// Class whose record applies to `class`.
    ///
    /// Extensions without an override use the PECL record.
    #[must_use]
    pub fn effective_class(&self, class: &ResourceClass) -> ResourceClass {
        match class.fallback_class() {
            Some(fallback) if !self.has_record(class) => fallback,
            _ => class.clone(),
        }
    }

    /// Mirrors configured for `class`, primary first.
    ///
    /// When no primary is configured the official upstream is listed as primary.
    #[must_use]
    pub fn list_mirrors(&self, class: &ResourceClass) -> Vec<MirrorEntry> {
        let record = self.file.classes.get(&class.key());
        let mut out = Vec::new();
        match record.and_then(|r| r.primary.as_ref()) {
            Some(p) => out.push(MirrorEntry {
                resource_class: class.clone(),
                name: p.name.clone(),
                url: p.url.clone(),
                is_primary: true,
                is_official: same_url(&p.url, self.official.for_class(class)),
            }),
            None => out.push(MirrorEntry {
                resource_class: class.clone(),
                name: "official".to_string(),
                url: self.official.for_class(class).to_string(),
                is_primary: true,
                is_official: true,
            }),
        }
        if let Some(record) = record {
            out.extend(record.fallbacks.iter().map(|f| MirrorEntry {
                resource_class: class.clone(),
                name: f.name.clone(),
                url: f.url.clone(),
                is_primary: false,
                is_official: same_url(&f.url, self.official.for_class(class)),
            }));
        }
        out
    }

    /// Make `url` the primary for `class`.
    ///
    /// A matching fallback is promoted (removed from the fallback list); the
    /// previous primary is dropped.
    ///
    /// # Errors
    /// Returns [`Error::InvalidMirrorUrl`] if the URL fails validation.
    pub fn set_primary(&mut self, class: &ResourceClass, url: &str) -> Result<()> {
        let parsed = validate_mirror_url(url)?;
        let normalized = normalize(&parsed);
        let record = self.file.classes.entry(class.key()).or_default();
        record.fallbacks.retain(|f| !same_url(&f.url, &normalized));
        let name = match &record.primary {
            Some(p) if same_url(&p.url, &normalized) => p.name.clone(),
            _ => {
                record.primary = None;
                record.unique_name(&parsed)
            }
        };
        record.primary = Some(MirrorRecord {
            name,
            url: normalized.clone(),
        });
        info!(class = %class, url = %normalized, "primary mirror set");
        Ok(())
    }

    /// Append a fallback for `class`. Adding a URL that is already present is a no-op.
    ///
    /// # Errors
    /// Returns [`Error::InvalidMirrorUrl`] if the URL fails validation.
    pub fn add_fallback(&mut self, class: &ResourceClass, url: &str) -> Result<()> {
        let parsed = validate_mirror_url(url)?;
        let normalized = normalize(&parsed);
        let record = self.file.classes.entry(class.key()).or_default();
        let present = record
            .primary
            .as_ref()
            .is_some_and(|p| same_url(&p.url, &normalized))
            || record.fallbacks.iter().any(|f| same_url(&f.url, &normalized));
        if present {
            debug!(class = %class, url = %normalized, "fallback already configured");
            return Ok(());
        }
        let name = record.unique_name(&parsed);
        record.fallbacks.push(MirrorRecord {
            name,
            url: normalized.clone(),
        });
        info!(class = %class, url = %normalized, "fallback mirror added");
        Ok(())
    }

    /// Remove a fallback from `class`.
    ///
    /// # Errors
    /// Returns [`Error::MirrorNotFound`] if it is not a configured fallback.
    pub fn remove_fallback(&mut self, class: &ResourceClass, url: &str) -> Result<()> {
        let not_found = || Error::MirrorNotFound {
            class: class.key(),
            url: url.to_string(),
        };
        let record = self
            .file
            .classes
            .get_mut(&class.key())
            .ok_or_else(not_found)?;
        let wanted =
            validate_mirror_url(url).map_or_else(|_| url.trim().to_string(), |u| normalize(&u));
        let before = record.fallbacks.len();
        record.fallbacks.retain(|f| !same_url(&f.url, &wanted));
        if record.fallbacks.len() == before {
            return Err(not_found());
        }
        if record.is_empty() {
            self.file.classes.remove(&class.key());
        }
        info!(class = %class, url, "fallback mirror removed");
        Ok(())
    }

    /// Drop all configuration for `class`, reverting it to the official upstream.
    pub fn reset(&mut self, class: &ResourceClass) {
        self.file.classes.remove(&class.key());
    }

    /// Reset every class and toggle.
    pub fn reset_all(&mut self) {
        self.file = RegistryFile::default();
    }

    /// Classes with their own records.
    #[must_use]
    pub fn configured_classes(&self) -> Vec<ResourceClass> {
        self.file
            .classes
            .keys()
            .filter_map(|k| k.parse().ok())
            .collect()
    }

    /// Mirror base URLs for `class`, primary first, excluding the implicit official primary.
    #[must_use]
    pub fn all_urls(&self, class: &ResourceClass) -> Vec<String> {
        self.file
            .classes
            .get(&class.key())
            .map(|r| {
                r.primary
                    .iter()
                    .chain(r.fallbacks.iter())
                    .map(|m| m.url.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Mirror base URLs that should be ranked for `class`.
    ///
    /// Empty when the registry is disabled.
    #[must_use]
    pub fn mirror_urls(&self, class: &ResourceClass) -> Vec<String> {
        if !self.is_enabled() {
            return Vec::new();
        }
        let effective = self.effective_class(class);
        let configured = self.all_urls(&effective);
        if configured.is_empty() || !self.has_primary(&effective) {
            let official = self.official.for_class(class).to_string();
            let rest = configured.into_iter().filter(|u| !same_url(u, &official));
            return std::iter::once(official.clone()).chain(rest).collect();
        }
        configured
    }

    fn has_primary(&self, class: &ResourceClass) -> bool {
        self.file
            .classes
            .get(&class.key())
            .is_some_and(|r| r.primary.is_some())
    }

    /// The official URL to append after mirrors, if any.
    ///
    /// `None` when auto-fallback is off or the official upstream is already a mirror.
    #[must_use]
    pub fn official_fallback(&self, class: &ResourceClass) -> Option<String> {
        let official = self.official.for_class(class);
        if !self.is_enabled() {
            return Some(official.to_string());
        }
        if !self.file.settings.auto_fallback {
            return None;
        }
        let present = self
            .mirror_urls(class)
            .iter()
            .any(|u| same_url(u, official));
        (!present).then(|| official.to_string())
    }

    /// Full candidate chain in configured order: mirrors, then official
    /// upstream when auto-fallback applies. Only the official upstream when disabled.
    #[must_use]
    pub fn candidates(&self, class: &ResourceClass) -> Vec<String> {
        let mut out = self.mirror_urls(class);
        out.extend(self.official_fallback(class));
        out
    }
}
