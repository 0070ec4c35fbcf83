//! Throwaway Overture homes for integration tests.
//!
//! The directory is removed when the [`TempHome`] is dropped.

use crate::fixtures::fake_php_script;
use overture_config::OverturePaths;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary `$OVERTURE_HOME` with its skeleton created.
#[derive(Debug)]
pub struct TempHome {
    dir: TempDir,
    paths: OverturePaths,
}

impl TempHome {
    /// Create a home with the standard directories.
    ///
    /// # Panics
    /// Panics if the temp directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp home");
        let paths = OverturePaths::with_root(dir.path().join("home"));
        paths.ensure_dirs().expect("create home skeleton");
        Self { dir, paths }
    }

    /// Root of the home.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.paths.root()
    }

    /// Layout rooted at this home.
    #[must_use]
    pub fn paths(&self) -> OverturePaths {
        self.paths.clone()
    }

    /// A fresh directory next to the home, for project pins.
    ///
    /// # Panics
    /// Panics on IO failure.
    #[must_use]
    pub fn project_dir(&self, name: &str) -> PathBuf {
        let dir = self.dir.path().join("projects").join(name);
        std::fs::create_dir_all(&dir).expect("create project dir");
        dir
    }

    /// Lay down `versions/<version>/bin/php` without touching the registry.
    ///
    /// # Panics
    /// Panics on IO failure.
    pub fn plant_runtime(&self, version: &str) -> PathBuf {
        let root = self.paths.version_dir(version);
        let bin = root.join("bin");
        std::fs::create_dir_all(&bin).expect("create bin dir");
        let php = bin.join("php");
        std::fs::write(&php, fake_php_script(version)).expect("write php");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&php, std::fs::Permissions::from_mode(0o755))
                .expect("chmod php");
        }
        root
    }

    /// Write `mirrors.json`.
    ///
    /// # Panics
    /// Panics on IO failure.
    pub fn write_mirrors(&self, json: &str) {
        std::fs::write(self.paths.mirrors_file(), json).expect("write mirrors.json");
    }

    /// Write `config.json`.
    ///
    /// # Panics
    /// Panics on IO failure.
    pub fn write_config(&self, json: &str) {
        std::fs::write(self.paths.config_file(), json).expect("write config.json");
    }
}

impl Default for TempHome {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_has_skeleton() {
        let home = TempHome::new();
        assert!(home.paths().versions_dir().is_dir());
        assert!(home.paths().logs_dir().is_dir());
        let root = home.plant_runtime("8.2.10");
        assert!(root.join("bin/php").is_file());
        assert!(home.project_dir("app").is_dir());
    }
}
