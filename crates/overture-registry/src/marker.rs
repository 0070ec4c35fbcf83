//! Pending-install markers.
//!
//! The installer drops `.overture-install.json` into a version directory
//! before unpacking and the registry removes it when the record is written.
//! A directory still holding a marker is an interrupted install.

use crate::types::SourceType;
use chrono::{DateTime, Utc};
use overture_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Marker file name inside a version directory.
pub const MARKER_FILE: &str = ".overture-install.json";

/// Contents of a pending-install marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallMarker {
    /// Version being installed.
    pub version: String,
    /// Intended origin.
    pub source_type: SourceType,
    /// When the install began.
    pub started_at: DateTime<Utc>,
}

impl InstallMarker {
    /// Marker for an install starting now.
    #[must_use]
    pub fn new(version: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            version: version.into(),
            source_type,
            started_at: Utc::now(),
        }
    }

    /// Write into `dir`, creating it if needed.
    ///
    /// # Errors
    /// Returns error if the directory or file cannot be written.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        let path = dir.join(MARKER_FILE);
        overture_core::write_json_file(&path, self)?;
        Ok(path)
    }

    /// Read the marker in `dir`. Unreadable markers count as absent.
    #[must_use]
    pub fn read(dir: &Path) -> Option<Self> {
        overture_core::read_json_file(&dir.join(MARKER_FILE))
            .ok()
            .flatten()
    }

    /// Whether `dir` holds a marker file at all.
    #[must_use]
    pub fn present(dir: &Path) -> bool {
        dir.join(MARKER_FILE).exists()
    }

    /// Remove the marker from `dir`.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be removed.
    pub fn clear(dir: &Path) -> Result<()> {
        let path = dir.join(MARKER_FILE);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(path, e)),
        }
    }
}
