//! Version pointers on disk.
//!
//! `current` and `global` are symlinks to an install prefix. Where symlinks
//! cannot be created the link path holds a plain file with the target path.
//! Project pins are `.php-version` files holding a version string.

use overture_core::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the per-project pin file.
pub const PIN_FILE: &str = ".php-version";

/// Point `link` at `target`, replacing whatever was there.
///
/// # Errors
/// Returns error if neither a symlink nor a pointer file can be written.
pub fn point_to(link: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = link.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    clear_pointer(link)?;
    match make_symlink(target, link) {
        Ok(()) => {
            debug!(link = %link.display(), target = %target.display(), "pointer linked");
            Ok(())
        }
        Err(e) => {
            debug!(link = %link.display(), error = %e, "symlink unavailable, writing pointer file");
            overture_core::write_atomic(link, target.to_string_lossy().as_bytes())
        }
    }
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

/// Target of `link`, if any.
#[must_use]
pub fn read_pointer(link: &Path) -> Option<PathBuf> {
    let meta = std::fs::symlink_metadata(link).ok()?;
    if meta.file_type().is_symlink() {
        return std::fs::read_link(link).ok();
    }
    if meta.is_file() {
        let raw = std::fs::read_to_string(link).ok()?;
        let trimmed = raw.trim();
        return (!trimmed.is_empty()).then(|| PathBuf::from(trimmed));
    }
    None
}

/// Remove `link`. Returns whether something was removed.
///
/// # Errors
/// Returns error if the link exists but cannot be removed.
pub fn clear_pointer(link: &Path) -> Result<bool> {
    let Ok(meta) = std::fs::symlink_metadata(link) else {
        return Ok(false);
    };
    let result = if meta.is_dir() && !meta.file_type().is_symlink() {
        std::fs::remove_dir(link)
    } else {
        std::fs::remove_file(link)
    };
    match result {
        Ok(()) => Ok(true),
        #[cfg(windows)]
        Err(_) if meta.file_type().is_symlink() => std::fs::remove_dir(link)
            .map(|()| true)
            .map_err(|e| Error::io(link, e)),
        Err(e) => Err(Error::io(link, e)),
    }
}

/// Version pinned directly in `dir`.
#[must_use]
pub fn read_pin(dir: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(dir.join(PIN_FILE)).ok()?;
    let version = raw.lines().next()?.trim();
    (!version.is_empty()).then(|| version.to_string())
}

/// Write `version` into `dir/.php-version`.
///
/// # Errors
/// Returns error if the file cannot be written.
pub fn write_pin(dir: &Path, version: &str) -> Result<PathBuf> {
    let path = dir.join(PIN_FILE);
    overture_core::write_atomic(&path, format!("{version}\n").as_bytes())?;
    Ok(path)
}

/// Delete `dir/.php-version`. Returns whether it existed.
///
/// # Errors
/// Returns error if the file exists but cannot be removed.
pub fn remove_pin(dir: &Path) -> Result<bool> {
    let path = dir.join(PIN_FILE);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Nearest pin at or above `start`.
#[must_use]
pub fn find_pin(start: &Path) -> Option<(PathBuf, String)> {
    start
        .ancestors()
        .find_map(|dir| read_pin(dir).map(|v| (dir.to_path_buf(), v)))
}

/// Canonical form of a project directory, falling back to the input.
#[must_use]
pub fn project_key(dir: &Path) -> PathBuf {
    std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pointer_replaces_previous_target() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();
        let link = dir.path().join("current");

        assert_eq!(read_pointer(&link), None);
        point_to(&link, &a).unwrap();
        assert_eq!(read_pointer(&link), Some(a));
        point_to(&link, &b).unwrap();
        assert_eq!(read_pointer(&link), Some(b));
        assert!(clear_pointer(&link).unwrap());
        assert!(!clear_pointer(&link).unwrap());
    }

    #[test]
    fn pointer_file_is_understood() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("global");
        std::fs::write(&link, "/opt/php/8.3.4\n").unwrap();
        assert_eq!(read_pointer(&link), Some(PathBuf::from("/opt/php/8.3.4")));
    }

    #[test]
    fn pins_are_found_in_ancestors() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("app/src/Http");
        std::fs::create_dir_all(&nested).unwrap();
        write_pin(&dir.path().join("app"), "8.2.10").unwrap();

        let (at, version) = find_pin(&nested).unwrap();
        assert_eq!(at, dir.path().join("app"));
        assert_eq!(version, "8.2.10");
        assert!(remove_pin(&at).unwrap());
        assert_eq!(find_pin(&nested), None);
    }
}
