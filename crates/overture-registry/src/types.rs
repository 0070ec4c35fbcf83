//! Installed-version records.

use chrono::{DateTime, Utc};
use overture_core::PhpVersion;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// How a runtime came to be on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    /// Compiled from a source tarball.
    SourceBuild,
    /// Unpacked from a prebuilt archive.
    Prebuilt,
    /// Provided by the operating system and registered by path.
    System,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SourceBuild => "source-build",
            Self::Prebuilt => "prebuilt",
            Self::System => "system",
        })
    }
}

/// Reconciled state of an installed version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    /// Usable and selected by the `current` or `global` pointer.
    Active,
    /// Usable.
    Installed,
    /// Directory present but the binary is missing or an install never finished.
    Incomplete,
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Installed => "installed",
            Self::Incomplete => "incomplete",
        })
    }
}

/// One installed runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledVersion {
    /// Release.
    pub version: PhpVersion,
    /// Install prefix (contains `bin/php`).
    pub install_path: PathBuf,
    /// Origin.
    pub source_type: SourceType,
    /// Status as of the last read.
    pub status: VersionStatus,
    /// When the record was written; absent for orphaned directories.
    pub installed_at: Option<DateTime<Utc>>,
}

impl InstalledVersion {
    /// A freshly installed runtime.
    #[must_use]
    pub fn new(version: PhpVersion, install_path: impl Into<PathBuf>, source_type: SourceType) -> Self {
        Self {
            version,
            install_path: install_path.into(),
            source_type,
            status: VersionStatus::Installed,
            installed_at: Some(Utc::now()),
        }
    }

    /// Path of the PHP binary.
    #[must_use]
    pub fn php_binary(&self) -> PathBuf {
        php_binary(&self.install_path)
    }

    /// Whether the runtime can be switched to.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.status != VersionStatus::Incomplete
    }
}

/// `bin/php` under an install prefix.
#[must_use]
pub fn php_binary(prefix: &Path) -> PathBuf {
    let name = if cfg!(windows) { "php.exe" } else { "php" };
    prefix.join("bin").join(name)
}

/// Pointer a switch updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchScope {
    /// The per-shell `current` link.
    Current,
    /// The system default.
    Global,
}

/// What selected a version for a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// A `.php-version` file in this directory.
    Project(PathBuf),
    /// The global default.
    Global,
}

/// Result of [`resolve_for_dir`](crate::VersionRegistry::resolve_for_dir).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Selected version.
    pub version: String,
    /// Where the selection came from.
    pub origin: Selection,
}

/// Result of a successful removal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Removal {
    /// Removed version.
    pub version: String,
    /// Pointers cleared as a consequence (`global`, `current`, `project <path>`).
    pub cleared: Vec<String>,
    /// Whether the install directory was deleted.
    pub deleted_files: bool,
}
