//! Crash-safe writes for small state files.
//!
//! Readers observe either the old or the new content, never a torn write:
//! 1. Write to a temp file in the target's directory
//! 2. `fsync` the temp file
//! 3. Rename over the target
//! 4. `fsync` the parent directory

use crate::{Error, Result};
use std::io::Write;
use std::path::Path;
use tracing::trace;

/// Atomically replace `path` with `bytes`, creating parent directories.
///
/// # Errors
/// Returns error if any stage of the write fails.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| Error::io(parent, e))?;
    temp.write_all(bytes).map_err(|e| Error::io(temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| Error::io(temp.path(), e))?;
    temp.persist(path).map_err(|e| Error::io(path, e.error))?;

    sync_parent_dir(path);
    trace!(path = %path.display(), bytes = bytes.len(), "atomic write committed");
    Ok(())
}

/// Flush the directory entry of `path` so a completed rename survives a crash.
///
/// Best effort: failures are ignored on platforms that cannot open directories.
pub fn sync_parent_dir(path: &Path) {
    #[cfg(unix)]
    if let Some(parent) = path.parent() {
        if let Ok(dir) = std::fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}
