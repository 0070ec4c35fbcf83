//! The version registry.
//!
//! `registry.json` is the durable record of installed runtimes, the global
//! default and known project pins. The registry is an owned value: open it at
//! the start of an operation, mutate, and each mutating call persists
//! atomically. Separate CLI processes race last-writer-wins.

use crate::marker::InstallMarker;
use crate::pointer::{
    clear_pointer, find_pin, point_to, project_key, read_pin, read_pointer, remove_pin, write_pin,
};
use crate::types::{
    InstalledVersion, Removal, Resolved, Selection, SourceType, SwitchScope, VersionStatus,
    php_binary,
};
use chrono::{DateTime, Utc};
use overture_config::OverturePaths;
use overture_core::{Error, PhpVersion, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct VersionRecord {
    install_path: PathBuf,
    source_type: SourceType,
    installed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    versions: BTreeMap<String, VersionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    global: Option<String>,
    #[serde(default)]
    pins: BTreeMap<String, String>,
}

/// Installed runtimes and the pointers selecting among them.
#[derive(Debug, Clone)]
pub struct VersionRegistry {
    paths: OverturePaths,
    file: RegistryFile,
}

impl VersionRegistry {
    /// Load the registry under `paths`; a missing file yields an empty registry.
    ///
    /// # Errors
    /// Returns [`Error::CorruptState`] if `registry.json` does not parse.
    pub fn open(paths: OverturePaths) -> Result<Self> {
        let file = overture_core::read_json_file(&paths.registry_file())?.unwrap_or_default();
        Ok(Self { paths, file })
    }

    /// Layout in use.
    #[must_use]
    pub const fn paths(&self) -> &OverturePaths {
        &self.paths
    }

    fn save(&self) -> Result<()> {
        overture_core::write_json_file(&self.paths.registry_file(), &self.file)?;
        debug!(path = %self.paths.registry_file().display(), "registry saved");
        Ok(())
    }

    /// Record a finished install and clear its pending marker.
    ///
    /// Re-installing a version replaces its record.
    ///
    /// # Errors
    /// Returns error if the registry cannot be written.
    pub fn install(&mut self, entry: &InstalledVersion) -> Result<()> {
        let version = entry.version.to_string();
        self.file.versions.insert(
            version.clone(),
            VersionRecord {
                install_path: entry.install_path.clone(),
                source_type: entry.source_type,
                installed_at: entry.installed_at.unwrap_or_else(Utc::now),
            },
        );
        self.save()?;
        if entry.source_type != SourceType::System {
            InstallMarker::clear(&entry.install_path)?;
        }
        info!(version = %version, path = %entry.install_path.display(), source = %entry.source_type, "version registered");
        Ok(())
    }

    /// Whether `version` has a record.
    #[must_use]
    pub fn is_installed(&self, version: &str) -> bool {
        self.file.versions.contains_key(version)
    }

    /// Recorded versions, oldest first.
    #[must_use]
    pub fn installed_versions(&self) -> Vec<PhpVersion> {
        let mut out: Vec<PhpVersion> = self
            .file
            .versions
            .keys()
            .filter_map(|k| PhpVersion::parse(k).ok())
            .collect();
        out.sort();
        out
    }

    /// Version selected by the `current` link, if it resolves to a record.
    #[must_use]
    pub fn current(&self) -> Option<String> {
        read_pointer(&self.paths.current_link()).and_then(|target| self.version_at(&target))
    }

    /// The global default.
    #[must_use]
    pub fn global(&self) -> Option<String> {
        self.file.global.clone()
    }

    fn version_at(&self, target: &Path) -> Option<String> {
        if let Some((version, _)) = self
            .file
            .versions
            .iter()
            .find(|(_, r)| r.install_path == target)
        {
            return Some(version.clone());
        }
        let name = target.file_name()?.to_str()?;
        self.file.versions.contains_key(name).then(|| name.to_string())
    }

    fn status_of(&self, version: &str, install_path: &Path, active: &[Option<String>]) -> VersionStatus {
        if InstallMarker::present(install_path) || !php_binary(install_path).is_file() {
            VersionStatus::Incomplete
        } else if active.iter().flatten().any(|v| v == version) {
            VersionStatus::Active
        } else {
            VersionStatus::Installed
        }
    }

    fn entry_for(&self, version: &str, record: &VersionRecord, active: &[Option<String>]) -> Option<InstalledVersion> {
        let parsed = match PhpVersion::parse(version) {
            Ok(v) => v,
            Err(e) => {
                warn!(version, error = %e, "skipping unparseable registry entry");
                return None;
            }
        };
        Some(InstalledVersion {
            version: parsed,
            install_path: record.install_path.clone(),
            source_type: record.source_type,
            status: self.status_of(version, &record.install_path, active),
            installed_at: Some(record.installed_at),
        })
    }

    /// Installed versions reconciled against the filesystem, oldest first.
    ///
    /// Records whose binary is missing, and version directories with no
    /// record at all, are reported as [`VersionStatus::Incomplete`].
    #[must_use]
    pub fn list(&self) -> Vec<InstalledVersion> {
        let active = [self.current(), self.global()];
        let mut out: Vec<InstalledVersion> = self
            .file
            .versions
            .iter()
            .filter_map(|(v, r)| self.entry_for(v, r, &active))
            .collect();
        out.extend(self.orphans());
        out.sort_by(|a, b| a.version.cmp(&b.version));
        out
    }

    fn orphans(&self) -> Vec<InstalledVersion> {
        let Ok(entries) = std::fs::read_dir(self.paths.versions_dir()) else {
            return Vec::new();
        };
        entries
            .flatten()
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .filter_map(|e| {
                let name = e.file_name().to_str()?.to_string();
                if self.file.versions.contains_key(&name) {
                    return None;
                }
                let version = PhpVersion::parse(&name).ok()?;
                let dir = e.path();
                let source_type = InstallMarker::read(&dir)
                    .map_or(SourceType::SourceBuild, |m| m.source_type);
                debug!(version = %version, "orphaned version directory");
                Some(InstalledVersion {
                    version,
                    install_path: dir,
                    source_type,
                    status: VersionStatus::Incomplete,
                    installed_at: None,
                })
            })
            .collect()
    }

    /// Reconciled entry for `version`, including orphaned directories.
    #[must_use]
    pub fn get(&self, version: &str) -> Option<InstalledVersion> {
        self.list()
            .into_iter()
            .find(|v| v.version.to_string() == version)
    }

    fn require(&self, version: &str) -> Result<InstalledVersion> {
        let active = [self.current(), self.global()];
        self.file
            .versions
            .get(version)
            .and_then(|r| self.entry_for(version, r, &active))
            .ok_or_else(|| Error::VersionNotInstalled {
                version: version.to_string(),
            })
    }

    /// Known project pins whose `.php-version` still matches.
    #[must_use]
    pub fn pins(&self) -> Vec<(PathBuf, String)> {
        self.file
            .pins
            .iter()
            .filter(|(dir, v)| read_pin(Path::new(dir)).as_deref() == Some(v.as_str()))
            .map(|(dir, v)| (PathBuf::from(dir), v.clone()))
            .collect()
    }

    fn prune_stale_pins(&mut self) -> bool {
        let before = self.file.pins.len();
        self.file
            .pins
            .retain(|dir, v| read_pin(Path::new(dir)).as_deref() == Some(v.as_str()));
        before != self.file.pins.len()
    }

    /// Pointers that would block removing `version`.
    #[must_use]
    pub fn usages(&self, version: &str) -> Vec<String> {
        let mut usages = Vec::new();
        if self.file.global.as_deref() == Some(version) {
            usages.push("global".to_string());
        }
        usages.extend(
            self.pins()
                .into_iter()
                .filter(|(_, v)| v == version)
                .map(|(dir, _)| format!("project {}", dir.display())),
        );
        usages
    }

    /// Remove `version` and its files.
    ///
    /// A version that is the global default or pinned by a known project is
    /// only removed with `force`, which also clears those pointers. The
    /// `current` link is cleared whenever it points at the removed version.
    /// Files of `system` runtimes are never deleted.
    ///
    /// # Errors
    /// - [`Error::VersionNotInstalled`] if there is neither a record nor a directory.
    /// - [`Error::VersionInUse`] if the version is referenced and `force` is false.
    pub fn remove(&mut self, version: &str, force: bool) -> Result<Removal> {
        let record = self.file.versions.get(version).cloned();
        let orphan_dir = self.paths.version_dir(version);
        if record.is_none() && !orphan_dir.is_dir() {
            return Err(Error::VersionNotInstalled {
                version: version.to_string(),
            });
        }

        self.prune_stale_pins();
        let usages = self.usages(version);
        if !usages.is_empty() && !force {
            return Err(Error::VersionInUse {
                version: version.to_string(),
                usages,
            });
        }

        let mut removal = Removal {
            version: version.to_string(),
            ..Removal::default()
        };
        let was_current = self.current().as_deref() == Some(version);

        // Files go first; pointers stay intact if the prefix cannot be deleted.
        let (path, source_type) = record.map_or((orphan_dir, SourceType::SourceBuild), |r| {
            (r.install_path, r.source_type)
        });
        if source_type != SourceType::System && path.starts_with(self.paths.versions_dir()) {
            match std::fs::remove_dir_all(&path) {
                Ok(()) => removal.deleted_files = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(version, path = %path.display(), error = %e, "failed to delete install");
                    return Err(Error::io(&path, e));
                }
            }
        }

        if was_current {
            clear_pointer(&self.paths.current_link())?;
            removal.cleared.push("current".to_string());
        }
        if self.file.global.as_deref() == Some(version) {
            self.file.global = None;
            clear_pointer(&self.paths.global_link())?;
            removal.cleared.push("global".to_string());
        }
        let pinned: Vec<String> = self
            .file
            .pins
            .iter()
            .filter(|(_, v)| v.as_str() == version)
            .map(|(dir, _)| dir.clone())
            .collect();
        for dir in pinned {
            remove_pin(Path::new(&dir))?;
            self.file.pins.remove(&dir);
            removal.cleared.push(format!("project {dir}"));
        }

        self.file.versions.remove(version);
        self.save()?;
        info!(version, forced = force, cleared = ?removal.cleared, "version removed");
        Ok(removal)
    }

    /// Point `scope` at `version`.
    ///
    /// # Errors
    /// Returns [`Error::VersionNotInstalled`] if the version has no record or
    /// its install is incomplete.
    pub fn switch(&mut self, version: &str, scope: SwitchScope) -> Result<InstalledVersion> {
        let entry = self.require(version)?;
        if !entry.is_usable() {
            warn!(version, "refusing to switch to an incomplete install");
            return Err(Error::VersionNotInstalled {
                version: version.to_string(),
            });
        }
        match scope {
            SwitchScope::Current => point_to(&self.paths.current_link(), &entry.install_path)?,
            SwitchScope::Global => {
                point_to(&self.paths.global_link(), &entry.install_path)?;
                self.file.global = Some(version.to_string());
                self.save()?;
            }
        }
        info!(version, scope = ?scope, "switched");
        Ok(InstalledVersion {
            status: VersionStatus::Active,
            ..entry
        })
    }

    /// Pin `version` to `project` by writing `.php-version` there.
    ///
    /// # Errors
    /// Returns [`Error::VersionNotInstalled`] for unknown versions, or an IO
    /// error if the pin file cannot be written.
    pub fn pin(&mut self, version: &str, project: &Path) -> Result<PathBuf> {
        self.require(version)?;
        let key = project_key(project);
        let file = write_pin(&key, version)?;
        self.file
            .pins
            .insert(key.to_string_lossy().into_owned(), version.to_string());
        self.save()?;
        info!(version, project = %key.display(), "project pinned");
        Ok(file)
    }

    /// Remove the pin in `project`, returning the version it held.
    ///
    /// # Errors
    /// Returns error if the pin file or registry cannot be written.
    pub fn unpin(&mut self, project: &Path) -> Result<Option<String>> {
        let key = project_key(project);
        let previous = read_pin(&key);
        remove_pin(&key)?;
        let tracked = self.file.pins.remove(&*key.to_string_lossy()).is_some();
        if tracked || self.prune_stale_pins() {
            self.save()?;
        }
        Ok(previous)
    }

    /// Version in effect for `dir`: the nearest `.php-version`, else global.
    #[must_use]
    pub fn resolve_for_dir(&self, dir: &Path) -> Option<Resolved> {
        if let Some((at, version)) = find_pin(dir) {
            return Some(Resolved {
                version,
                origin: Selection::Project(at),
            });
        }
        self.global().map(|version| Resolved {
            version,
            origin: Selection::Global,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overture_test_utils::TempHome;
    use pretty_assertions::assert_eq;

    fn install(home: &TempHome, registry: &mut VersionRegistry, version: &str) -> InstalledVersion {
        let path = home.plant_runtime(version);
        let entry = InstalledVersion::new(PhpVersion::parse(version).unwrap(), path, SourceType::Prebuilt);
        registry.install(&entry).unwrap();
        entry
    }

    fn statuses(registry: &VersionRegistry) -> Vec<(String, VersionStatus)> {
        registry
            .list()
            .into_iter()
            .map(|v| (v.version.to_string(), v.status))
            .collect()
    }

    #[test]
    fn list_reconciles_with_filesystem() {
        let home = TempHome::new();
        let mut registry = VersionRegistry::open(home.paths()).unwrap();
        install(&home, &mut registry, "8.3.4");
        let broken = install(&home, &mut registry, "8.1.27");
        std::fs::remove_file(broken.php_binary()).unwrap();

        let orphan = home.paths().version_dir("8.2.10");
        InstallMarker::new("8.2.10", SourceType::Prebuilt)
            .write(&orphan)
            .unwrap();

        assert_eq!(
            statuses(&registry),
            vec![
                ("8.1.27".to_string(), VersionStatus::Incomplete),
                ("8.2.10".to_string(), VersionStatus::Incomplete),
                ("8.3.4".to_string(), VersionStatus::Installed),
            ]
        );
        let orphan = registry.get("8.2.10").unwrap();
        assert_eq!(orphan.source_type, SourceType::Prebuilt);
        assert_eq!(orphan.installed_at, None);
    }

    #[test]
    fn install_clears_pending_marker() {
        let home = TempHome::new();
        let mut registry = VersionRegistry::open(home.paths()).unwrap();
        let dir = home.plant_runtime("8.3.4");
        InstallMarker::new("8.3.4", SourceType::SourceBuild)
            .write(&dir)
            .unwrap();
        assert_eq!(registry.get("8.3.4").unwrap().status, VersionStatus::Incomplete);

        let entry = InstalledVersion::new(PhpVersion::new(8, 3, 4), dir.clone(), SourceType::SourceBuild);
        registry.install(&entry).unwrap();
        assert!(!InstallMarker::present(&dir));
        assert_eq!(registry.get("8.3.4").unwrap().status, VersionStatus::Installed);
    }

    #[test]
    fn switch_requires_a_usable_install() {
        let home = TempHome::new();
        let mut registry = VersionRegistry::open(home.paths()).unwrap();
        let err = registry.switch("8.3.4", SwitchScope::Current).unwrap_err();
        assert!(matches!(err, Error::VersionNotInstalled { .. }));

        let entry = install(&home, &mut registry, "8.3.4");
        std::fs::remove_file(entry.php_binary()).unwrap();
        let err = registry.switch("8.3.4", SwitchScope::Global).unwrap_err();
        assert!(matches!(err, Error::VersionNotInstalled { .. }));
        assert_eq!(registry.global(), None);
    }

    #[test]
    fn switch_moves_pointers() {
        let home = TempHome::new();
        let mut registry = VersionRegistry::open(home.paths()).unwrap();
        let a = install(&home, &mut registry, "8.2.10");
        install(&home, &mut registry, "8.3.4");

        registry.switch("8.2.10", SwitchScope::Current).unwrap();
        assert_eq!(registry.current().as_deref(), Some("8.2.10"));
        assert_eq!(read_pointer(&home.paths().current_link()), Some(a.install_path));
        assert_eq!(registry.global(), None);

        registry.switch("8.3.4", SwitchScope::Global).unwrap();
        assert_eq!(registry.global().as_deref(), Some("8.3.4"));
        assert_eq!(
            statuses(&registry),
            vec![
                ("8.2.10".to_string(), VersionStatus::Active),
                ("8.3.4".to_string(), VersionStatus::Active),
            ]
        );

        let reopened = VersionRegistry::open(home.paths()).unwrap();
        assert_eq!(reopened.global().as_deref(), Some("8.3.4"));
        assert_eq!(reopened.current().as_deref(), Some("8.2.10"));
    }

    #[test]
    fn global_version_needs_force() {
        let home = TempHome::new();
        let mut registry = VersionRegistry::open(home.paths()).unwrap();
        let entry = install(&home, &mut registry, "8.3.4");
        registry.switch("8.3.4", SwitchScope::Global).unwrap();

        let err = registry.remove("8.3.4", false).unwrap_err();
        match err {
            Error::VersionInUse { usages, .. } => assert_eq!(usages, vec!["global".to_string()]),
            other => panic!("expected VersionInUse, got {other:?}"),
        }
        assert!(registry.is_installed("8.3.4"));

        let removal = registry.remove("8.3.4", true).unwrap();
        assert_eq!(removal.cleared, vec!["global".to_string()]);
        assert!(removal.deleted_files);
        assert_eq!(registry.global(), None);
        assert!(!entry.install_path.exists());
        assert_eq!(read_pointer(&home.paths().global_link()), None);
    }

    #[test]
    fn failed_delete_keeps_pointers_and_record() {
        let home = TempHome::new();
        let mut registry = VersionRegistry::open(home.paths()).unwrap();
        let entry = install(&home, &mut registry, "8.3.4");
        registry.switch("8.3.4", SwitchScope::Global).unwrap();
        registry.switch("8.3.4", SwitchScope::Current).unwrap();
        let project = home.project_dir("app");
        registry.pin("8.3.4", &project).unwrap();

        // A plain file where the prefix directory should be cannot be removed
        // as a tree.
        std::fs::remove_dir_all(&entry.install_path).unwrap();
        std::fs::write(&entry.install_path, b"not a directory").unwrap();

        let err = registry.remove("8.3.4", true).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));

        let reopened = VersionRegistry::open(home.paths()).unwrap();
        assert_eq!(reopened.global().as_deref(), Some("8.3.4"));
        assert_eq!(reopened.current().as_deref(), Some("8.3.4"));
        assert!(read_pointer(&home.paths().global_link()).is_some());
        assert_eq!(read_pin(&project).as_deref(), Some("8.3.4"));
        assert!(reopened.get("8.3.4").is_some());
    }

    #[test]
    fn pinned_version_needs_force() {
        let home = TempHome::new();
        let mut registry = VersionRegistry::open(home.paths()).unwrap();
        install(&home, &mut registry, "7.4.1");
        let project = home.project_dir("legacy");
        registry.pin("7.4.1", &project).unwrap();

        let err = registry.remove("7.4.1", false).unwrap_err();
        assert!(matches!(err, Error::VersionInUse { .. }));

        let removal = registry.remove("7.4.1", true).unwrap();
        assert_eq!(removal.cleared.len(), 1);
        assert!(removal.cleared[0].starts_with("project "));
        assert_eq!(read_pin(&project), None);
    }

    #[test]
    fn stale_pins_do_not_block_removal() {
        let home = TempHome::new();
        let mut registry = VersionRegistry::open(home.paths()).unwrap();
        install(&home, &mut registry, "8.1.27");
        install(&home, &mut registry, "8.3.4");
        let project = home.project_dir("app");
        registry.pin("8.1.27", &project).unwrap();
        write_pin(&project, "8.3.4").unwrap();

        let removal = registry.remove("8.1.27", false).unwrap();
        assert!(removal.cleared.is_empty());
        assert_eq!(read_pin(&project).as_deref(), Some("8.3.4"));
    }

    #[test]
    fn removing_current_clears_the_link() {
        let home = TempHome::new();
        let mut registry = VersionRegistry::open(home.paths()).unwrap();
        install(&home, &mut registry, "8.3.4");
        registry.switch("8.3.4", SwitchScope::Current).unwrap();

        let removal = registry.remove("8.3.4", false).unwrap();
        assert_eq!(removal.cleared, vec!["current".to_string()]);
        assert_eq!(registry.current(), None);
    }

    #[test]
    fn unknown_versions_cannot_be_removed() {
        let home = TempHome::new();
        let mut registry = VersionRegistry::open(home.paths()).unwrap();
        let err = registry.remove("5.6.40", true).unwrap_err();
        assert!(matches!(err, Error::VersionNotInstalled { .. }));
    }

    #[test]
    fn orphaned_directories_can_be_removed() {
        let home = TempHome::new();
        let mut registry = VersionRegistry::open(home.paths()).unwrap();
        let dir = home.paths().version_dir("8.0.30");
        InstallMarker::new("8.0.30", SourceType::SourceBuild)
            .write(&dir)
            .unwrap();
        let removal = registry.remove("8.0.30", false).unwrap();
        assert!(removal.deleted_files);
        assert!(!dir.exists());
    }

    #[test]
    fn system_runtimes_keep_their_files() {
        let home = TempHome::new();
        let mut registry = VersionRegistry::open(home.paths()).unwrap();
        let prefix = home.project_dir("usr");
        let entry = InstalledVersion::new(PhpVersion::new(8, 1, 2), prefix.clone(), SourceType::System);
        registry.install(&entry).unwrap();

        let removal = registry.remove("8.1.2", false).unwrap();
        assert!(!removal.deleted_files);
        assert!(prefix.is_dir());
    }

    #[test]
    fn resolution_prefers_project_pins() {
        let home = TempHome::new();
        let mut registry = VersionRegistry::open(home.paths()).unwrap();
        install(&home, &mut registry, "8.2.10");
        install(&home, &mut registry, "8.3.4");
        registry.switch("8.3.4", SwitchScope::Global).unwrap();
        let project = home.project_dir("shop");
        registry.pin("8.2.10", &project).unwrap();
        let nested = project.join("src");
        std::fs::create_dir_all(&nested).unwrap();

        let resolved = registry.resolve_for_dir(&nested).unwrap();
        assert_eq!(resolved.version, "8.2.10");
        assert!(matches!(resolved.origin, Selection::Project(_)));

        let elsewhere = home.project_dir("blog");
        let resolved = registry.resolve_for_dir(&elsewhere).unwrap();
        assert_eq!(resolved.version, "8.3.4");
        assert_eq!(resolved.origin, Selection::Global);

        assert_eq!(registry.unpin(&project).unwrap().as_deref(), Some("8.2.10"));
        assert!(registry.pins().is_empty());
    }

    #[test]
    fn corrupt_registry_is_reported() {
        let home = TempHome::new();
        std::fs::write(home.paths().registry_file(), "{ not json").unwrap();
        let err = VersionRegistry::open(home.paths()).unwrap_err();
        assert!(matches!(err, Error::CorruptState { .. }));
    }
}
