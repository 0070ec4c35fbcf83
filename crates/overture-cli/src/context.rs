//! Execution context shared by all commands.

use overture_cache::ArtifactCache;
use overture_config::{EnvConfig, OverturePaths, Settings, load_settings};
use overture_installer::{InstallationPipeline, Upstreams, standard_pipeline};
use overture_mirror::MirrorRegistry;
use overture_registry::VersionRegistry;
use std::path::PathBuf;

/// Resolved environment, home layout and settings.
#[derive(Debug)]
pub struct Context {
    /// Home layout.
    pub paths: OverturePaths,
    /// Settings after environment overrides.
    pub settings: Settings,
    /// Suppress informational output.
    pub quiet: bool,
    /// Answer yes to every confirmation.
    pub assume_yes: bool,
}

impl Context {
    /// Read the environment and `config.json`.
    pub fn new(quiet: bool, assume_yes: bool) -> anyhow::Result<Self> {
        let env = EnvConfig::from_env().map_err(overture_core::Error::from)?;
        let paths = OverturePaths::resolve(&env).map_err(overture_core::Error::from)?;
        let settings =
            load_settings(&paths.config_file(), &env).map_err(overture_core::Error::from)?;
        Ok(Self {
            paths,
            settings,
            quiet,
            assume_yes,
        })
    }

    /// Open the version registry.
    pub fn registry(&self) -> overture_core::Result<VersionRegistry> {
        VersionRegistry::open(self.paths.clone())
    }

    /// Load the mirror configuration.
    pub fn mirrors(&self) -> overture_core::Result<MirrorRegistry> {
        MirrorRegistry::load(self.paths.mirrors_file())
    }

    /// Open the artifact cache.
    pub fn cache(&self) -> overture_core::Result<ArtifactCache> {
        ArtifactCache::at_path(self.paths.artifacts_dir())
    }

    /// Pipeline wired to the network, with progress bars unless quiet.
    pub fn pipeline(&self) -> overture_core::Result<InstallationPipeline> {
        standard_pipeline(
            self.paths.clone(),
            self.settings.clone(),
            &Upstreams::default(),
            !self.quiet && crate::output::is_tty(),
        )
    }

    /// Working directory, or `dir` when given.
    pub fn dir_or_cwd(&self, dir: Option<&PathBuf>) -> anyhow::Result<PathBuf> {
        match dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }
}
