//! On-disk layout of the Overture home.
//!
//! ```text
//! $OVERTURE_HOME/
//!   versions/<X.Y.Z>/        installed runtimes
//!   cache/artifacts/         verified downloads
//!   cache/speed-test.json    mirror ranking cache
//!   logs/                    build logs
//!   shims/
//!   mirrors.json
//!   config.json
//!   registry.json
//!   checksums.json           pinned reference checksums
//!   current -> versions/...  default shell link
//!   global  -> versions/...  system default link
//! ```

use crate::env::EnvConfig;
use crate::error::{ConfigError, Result};
use std::path::{Path, PathBuf};

/// Paths under the Overture home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverturePaths {
    root: PathBuf,
    shell_link: Option<PathBuf>,
}

impl OverturePaths {
    /// Resolve from `OVERTURE_HOME` or the platform data directory.
    ///
    /// # Errors
    /// Returns [`ConfigError::NoHome`] if neither is available.
    pub fn resolve(env: &EnvConfig) -> Result<Self> {
        let root = match &env.home {
            Some(home) => home.clone(),
            None => overture_platform::Platform::current()
                .default_home()
                .ok_or(ConfigError::NoHome)?,
        };
        Ok(Self {
            root,
            shell_link: env.shell_link.clone(),
        })
    }

    /// Use an explicit root (tests and embedding).
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            shell_link: None,
        }
    }

    /// Override the per-shell `current` link.
    #[must_use]
    pub fn with_shell_link(mut self, link: impl Into<PathBuf>) -> Self {
        self.shell_link = Some(link.into());
        self
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Installed runtimes.
    #[must_use]
    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    /// Install root for one version.
    #[must_use]
    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.versions_dir().join(version)
    }

    /// Cache root.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    /// Verified artifact store.
    #[must_use]
    pub fn artifacts_dir(&self) -> PathBuf {
        self.cache_dir().join("artifacts")
    }

    /// Mirror ranking cache.
    #[must_use]
    pub fn speed_test_cache(&self) -> PathBuf {
        self.cache_dir().join("speed-test.json")
    }

    /// Build scratch space.
    #[must_use]
    pub fn build_dir(&self) -> PathBuf {
        self.cache_dir().join("build")
    }

    /// Mirror configuration.
    #[must_use]
    pub fn mirrors_file(&self) -> PathBuf {
        self.root.join("mirrors.json")
    }

    /// Settings file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Version registry state.
    #[must_use]
    pub fn registry_file(&self) -> PathBuf {
        self.root.join("registry.json")
    }

    /// Pinned reference checksums.
    #[must_use]
    pub fn checksums_file(&self) -> PathBuf {
        self.root.join("checksums.json")
    }

    /// Build logs.
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Shims directory.
    #[must_use]
    pub fn shims_dir(&self) -> PathBuf {
        self.root.join("shims")
    }

    /// Link for the `current` pointer.
    #[must_use]
    pub fn current_link(&self) -> PathBuf {
        self.shell_link
            .clone()
            .unwrap_or_else(|| self.root.join("current"))
    }

    /// Link for the `global` pointer.
    #[must_use]
    pub fn global_link(&self) -> PathBuf {
        self.root.join("global")
    }

    /// Create the directory skeleton.
    ///
    /// # Errors
    /// Returns error if a directory cannot be created.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.versions_dir(),
            self.artifacts_dir(),
            self.logs_dir(),
            self.shims_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| ConfigError::io(&dir, e))?;
        }
        Ok(())
    }
}
