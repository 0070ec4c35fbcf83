//! The install pipeline.
//!
//! `Requested → Resolving → Fetching → Verifying → Unpacking → Building|Placing
//! → Registering → Done`, with `Failed` reachable from every step.

use crate::build::{self, CommandRunner, ProcessRunner};
use crate::catalog::VersionCatalog;
use crate::options::InstallOptions;
use overture_cache::ArtifactCacheEntry;
use overture_config::{OverturePaths, Settings};
use overture_core::{Artifact, Error, PhpVersion, ResourceClass, Result, VersionSpec};
use overture_downloader::{DownloadManager, ExtractOptions, Extractor, FetchEvent, FetchRequest};
use overture_mirror::{MirrorRegistry, OfficialUpstreams};
use overture_registry::{
    InstallMarker, InstalledVersion, Removal, SourceType, SwitchScope, VersionRegistry, php_binary,
};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Extensions loaded with `zend_extension=`.
const ZEND_EXTENSIONS: &[&str] = &["xdebug", "opcache"];

/// Pipeline position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallState {
    /// Accepted.
    Requested,
    /// Matching the spec against the catalog.
    Resolving,
    /// Downloading from a candidate.
    Fetching,
    /// Checking the download against its reference.
    Verifying,
    /// Extracting the archive.
    Unpacking,
    /// Running configure/make.
    Building,
    /// Moving files into place.
    Placing,
    /// Writing the registry record.
    Registering,
    /// Finished.
    Done,
    /// Stopped with a reason.
    Failed(String),
}

impl InstallState {
    /// Whether no further transition follows.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("requested"),
            Self::Resolving => f.write_str("resolving"),
            Self::Fetching => f.write_str("fetching"),
            Self::Verifying => f.write_str("verifying"),
            Self::Unpacking => f.write_str("unpacking"),
            Self::Building => f.write_str("building"),
            Self::Placing => f.write_str("placing"),
            Self::Registering => f.write_str("registering"),
            Self::Done => f.write_str("done"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Callback receiving every state transition.
pub type StateObserver = Arc<dyn Fn(&InstallState) + Send + Sync>;

struct StateTracker {
    history: Vec<InstallState>,
    observer: Option<StateObserver>,
}

impl StateTracker {
    fn new(observer: Option<StateObserver>) -> Self {
        let mut tracker = Self {
            history: Vec::new(),
            observer,
        };
        tracker.enter(InstallState::Requested);
        tracker
    }

    fn enter(&mut self, state: InstallState) {
        if self.history.last() == Some(&state) {
            return;
        }
        debug!(state = %state, "install state");
        if let Some(observer) = &self.observer {
            observer(&state);
        }
        self.history.push(state);
    }

    fn on_fetch_event(&mut self, event: &FetchEvent) {
        match event {
            FetchEvent::Attempt { .. } => self.enter(InstallState::Fetching),
            FetchEvent::Downloaded { .. } => self.enter(InstallState::Verifying),
            _ => {}
        }
    }

    fn fail(&mut self, err: &Error) {
        self.enter(InstallState::Failed(err.to_string()));
    }
}

/// Outcome of a PHP install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Installed release.
    pub version: PhpVersion,
    /// How it was installed.
    pub source_type: SourceType,
    /// Install prefix.
    pub install_path: PathBuf,
    /// Whether the version was already registered and nothing was done.
    pub already_installed: bool,
    /// Pointer moved after the install.
    pub switched: Option<SwitchScope>,
    /// Why the requested switch failed; the install itself still stands.
    pub switch_error: Option<String>,
    /// Every state visited.
    pub history: Vec<InstallState>,
}

/// Outcome of a Composer or extension install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolReport {
    /// `composer` or `ext-<name>`.
    pub target: String,
    /// Installed release.
    pub version: String,
    /// PHP version it was installed into.
    pub php: String,
    /// Main file written (`bin/composer` or the extension ini).
    pub path: PathBuf,
    /// Every state visited.
    pub history: Vec<InstallState>,
}

/// Orchestrates installs and removals against one Overture home.
pub struct InstallationPipeline {
    paths: OverturePaths,
    settings: Settings,
    downloads: DownloadManager,
    catalog: Arc<dyn VersionCatalog>,
    runner: Arc<dyn CommandRunner>,
    official: OfficialUpstreams,
    prebuilt_target: Option<String>,
    observer: Option<StateObserver>,
}

impl fmt::Debug for InstallationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallationPipeline")
            .field("root", &self.paths.root())
            .field("downloads", &self.downloads)
            .field("catalog", &self.catalog.name())
            .field("prebuilt_target", &self.prebuilt_target)
            .finish_non_exhaustive()
    }
}

impl InstallationPipeline {
    /// Pipeline running real build processes for the current platform.
    #[must_use]
    pub fn new(
        paths: OverturePaths,
        settings: Settings,
        downloads: DownloadManager,
        catalog: Arc<dyn VersionCatalog>,
    ) -> Self {
        let platform = overture_platform::Platform::current();
        Self {
            paths,
            settings,
            downloads,
            catalog,
            runner: Arc::new(ProcessRunner),
            official: OfficialUpstreams::default(),
            prebuilt_target: platform.supports_prebuilt().then(|| platform.target()),
            observer: None,
        }
    }

    /// Execute build steps through `runner`.
    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Override the official upstreams.
    #[must_use]
    pub fn with_official(mut self, official: OfficialUpstreams) -> Self {
        self.official = official;
        self
    }

    /// Prebuilt binary target; `None` disables prebuilt installs.
    #[must_use]
    pub fn with_prebuilt_target(mut self, target: Option<String>) -> Self {
        self.prebuilt_target = target;
        self
    }

    /// Report state transitions to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: StateObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Home layout.
    #[must_use]
    pub const fn paths(&self) -> &OverturePaths {
        &self.paths
    }

    /// Download manager.
    #[must_use]
    pub const fn downloads(&self) -> &DownloadManager {
        &self.downloads
    }

    fn mirrors(&self) -> Result<MirrorRegistry> {
        Ok(MirrorRegistry::load(self.paths.mirrors_file())?.with_official(self.official.clone()))
    }

    fn registry(&self) -> Result<VersionRegistry> {
        VersionRegistry::open(self.paths.clone())
    }

    /// Known releases of `class`, oldest first.
    ///
    /// # Errors
    /// Returns error if the catalog cannot be read.
    pub async fn available(&self, class: &ResourceClass) -> Result<Vec<PhpVersion>> {
        let mut versions: Vec<PhpVersion> = self
            .catalog
            .versions(class)
            .await?
            .iter()
            .filter_map(|v| PhpVersion::parse(v).ok())
            .collect();
        versions.sort();
        versions.dedup();
        Ok(versions)
    }

    /// Latest release of `class` matching `spec`.
    ///
    /// # Errors
    /// - [`Error::InvalidVersionSpec`] if `spec` does not parse.
    /// - [`Error::UnknownVersion`] if nothing matches.
    pub async fn resolve(&self, class: &ResourceClass, spec: &str) -> Result<PhpVersion> {
        let spec = VersionSpec::parse(spec)?;
        let available = self.available(class).await?;
        let version = spec.resolve_or_err(&available)?;
        debug!(class = %class, spec = %spec, version = %version, "version resolved");
        Ok(version)
    }

    async fn fetch(
        &self,
        artifact: Artifact,
        options: &InstallOptions,
        tracker: &mut StateTracker,
    ) -> Result<ArtifactCacheEntry> {
        let mirrors = self.mirrors()?;
        let request = FetchRequest::new(artifact)
            .use_cache(options.use_cache)
            .threading(options.use_multi_thread, options.thread_count)
            .verify_signature(options.verify_signature);
        tracker.enter(InstallState::Fetching);
        let entry = self
            .downloads
            .fetch_with(&mirrors, &request, |event| tracker.on_fetch_event(&event))
            .await?;
        tracker.enter(InstallState::Verifying);
        Ok(entry)
    }

    async fn unpack(entry: &ArtifactCacheEntry, artifact: &Artifact, dest: &Path) -> Result<()> {
        remove_dir_if_present(dest).await?;
        let result = Extractor::with_options(ExtractOptions::new().with_strip_prefix(1))
            .extract(&entry.path, &artifact.file_name, dest)
            .await?;
        debug!(dest = %dest.display(), files = result.files_extracted, "archive unpacked");
        Ok(())
    }

    /// Install the PHP release matching `spec`.
    ///
    /// # Errors
    /// Returns the first failure: invalid options, [`Error::UnknownVersion`],
    /// fetch and verification errors, [`Error::BuildFailed`], or registry
    /// write errors. A failed switch is reported in the result instead.
    pub async fn install(&self, spec: &str, options: &InstallOptions) -> Result<InstallReport> {
        let mut tracker = StateTracker::new(self.observer.clone());
        match self.install_php(spec, options, &mut tracker).await {
            Ok(mut report) => {
                tracker.enter(InstallState::Done);
                report.history = tracker.history;
                Ok(report)
            }
            Err(e) => {
                tracker.fail(&e);
                Err(e)
            }
        }
    }

    async fn install_php(
        &self,
        spec: &str,
        options: &InstallOptions,
        tracker: &mut StateTracker,
    ) -> Result<InstallReport> {
        options.validate()?;
        tracker.enter(InstallState::Resolving);
        let version = self.resolve(&ResourceClass::Php, spec).await?;
        let key = version.to_string();

        let mut registry = self.registry()?;
        let existing = registry.get(&key).filter(InstalledVersion::is_usable);
        if let Some(existing) = existing.filter(|_| !options.reinstall) {
            info!(version = %version, "already installed");
            let (switched, switch_error) = Self::switch_after(&mut registry, &key, options.switch_to);
            return Ok(InstallReport {
                version,
                source_type: existing.source_type,
                install_path: existing.install_path,
                already_installed: true,
                switched,
                switch_error,
                history: Vec::new(),
            });
        }

        let (artifact, source_type) = if options.from_source {
            (Artifact::php_source(&version), SourceType::SourceBuild)
        } else {
            let target = self.prebuilt_target.as_deref().ok_or_else(|| {
                Error::invalid_option("from_source", "no prebuilt binaries exist for this platform")
            })?;
            (Artifact::php_prebuilt(&version, target), SourceType::Prebuilt)
        };

        let entry = self.fetch(artifact.clone(), options, tracker).await?;

        let prefix = self.paths.version_dir(&key);
        remove_dir_if_present(&prefix).await?;
        InstallMarker::new(&key, source_type).write(&prefix)?;

        let placed = match source_type {
            SourceType::Prebuilt => self.place_prebuilt(&entry, &artifact, &prefix, tracker).await,
            _ => self.build_php(&entry, &artifact, &prefix, options, tracker).await,
        };
        if let Err(e) = placed {
            warn!(version = %version, error = %e, "install failed, removing partial files");
            if let Err(cleanup) = remove_dir_if_present(&prefix).await {
                warn!(path = %prefix.display(), error = %cleanup, "could not remove partial install");
            }
            return Err(e);
        }

        tracker.enter(InstallState::Registering);
        registry.install(&InstalledVersion::new(version.clone(), &prefix, source_type))?;
        let (switched, switch_error) = Self::switch_after(&mut registry, &key, options.switch_to);

        info!(version = %version, source = %source_type, path = %prefix.display(), "PHP installed");
        Ok(InstallReport {
            version,
            source_type,
            install_path: prefix,
            already_installed: false,
            switched,
            switch_error,
            history: Vec::new(),
        })
    }

    fn switch_after(
        registry: &mut VersionRegistry,
        version: &str,
        scope: Option<SwitchScope>,
    ) -> (Option<SwitchScope>, Option<String>) {
        let Some(scope) = scope else {
            return (None, None);
        };
        match registry.switch(version, scope) {
            Ok(_) => (Some(scope), None),
            Err(e) => {
                warn!(version, error = %e, "installed, but switching failed");
                (None, Some(e.to_string()))
            }
        }
    }

    async fn build_php(
        &self,
        entry: &ArtifactCacheEntry,
        artifact: &Artifact,
        prefix: &Path,
        options: &InstallOptions,
        tracker: &mut StateTracker,
    ) -> Result<()> {
        let source_dir = self.paths.build_dir().join(format!("php-{}", artifact.version));
        tracker.enter(InstallState::Unpacking);
        Self::unpack(entry, artifact, &source_dir).await?;

        tracker.enter(InstallState::Building);
        let flags: Vec<String> = self
            .settings
            .build
            .baseline_configure_flags
            .iter()
            .chain(&options.extra_configure_flags)
            .cloned()
            .collect();
        let steps = build::php_source_steps(
            &source_dir,
            prefix,
            &flags,
            self.settings.build.effective_jobs(),
        );
        let log = build::log_path(&self.paths.logs_dir(), "php", &artifact.version);
        let built = build::run_steps(self.runner.as_ref(), "php", &steps, &log).await;

        let built = built.and_then(|()| {
            if php_binary(prefix).is_file() {
                Ok(())
            } else {
                Err(Error::BuildFailed {
                    target: "php".to_string(),
                    step: "make install".to_string(),
                    exit_code: Some(0),
                    log_path: log.clone(),
                    excerpt: vec![format!("{} was not installed", php_binary(prefix).display())],
                })
            }
        });

        if !options.keep_source {
            if let Err(e) = remove_dir_if_present(&source_dir).await {
                warn!(path = %source_dir.display(), error = %e, "could not remove source tree");
            }
        }
        if built.is_ok() && !self.settings.build.keep_logs {
            if let Err(e) = tokio::fs::remove_file(&log).await {
                warn!(path = %log.display(), error = %e, "could not remove build log");
            }
        }
        built
    }

    async fn place_prebuilt(
        &self,
        entry: &ArtifactCacheEntry,
        artifact: &Artifact,
        prefix: &Path,
        tracker: &mut StateTracker,
    ) -> Result<()> {
        let staging = self
            .paths
            .build_dir()
            .join(format!("php-{}-prebuilt", artifact.version));
        tracker.enter(InstallState::Unpacking);
        Self::unpack(entry, artifact, &staging).await?;

        tracker.enter(InstallState::Placing);
        let placed = move_contents(&staging, prefix).await;
        if let Err(e) = remove_dir_if_present(&staging).await {
            warn!(path = %staging.display(), error = %e, "could not remove staging directory");
        }
        placed?;
        if !php_binary(prefix).is_file() {
            return Err(Error::archive(format!(
                "{} does not contain bin/php",
                artifact.file_name
            )));
        }
        Ok(())
    }

    fn usable_php(&self, php: &str) -> Result<InstalledVersion> {
        self.registry()?
            .get(php)
            .filter(InstalledVersion::is_usable)
            .ok_or_else(|| Error::VersionNotInstalled {
                version: php.to_string(),
            })
    }

    /// Place the Composer release matching `spec` into `<php>/bin/composer`.
    ///
    /// # Errors
    /// Returns [`Error::VersionNotInstalled`] if `php` is not usable, or any
    /// resolve, fetch or write error.
    pub async fn install_composer(
        &self,
        spec: &str,
        php: &str,
        options: &InstallOptions,
    ) -> Result<ToolReport> {
        let mut tracker = StateTracker::new(self.observer.clone());
        let result = async {
            let runtime = self.usable_php(php)?;
            tracker.enter(InstallState::Resolving);
            let version = self.resolve(&ResourceClass::Composer, spec).await?;
            let artifact = Artifact::composer(&version.to_string());
            let entry = self.fetch(artifact, options, &mut tracker).await?;

            tracker.enter(InstallState::Placing);
            let bin = runtime.install_path.join("bin");
            tokio::fs::create_dir_all(&bin)
                .await
                .map_err(|e| Error::io(&bin, e))?;
            let dest = bin.join("composer");
            tokio::fs::copy(&entry.path, &dest)
                .await
                .map_err(|e| Error::io(&dest, e))?;
            make_executable(&dest).await?;
            info!(version = %version, php, path = %dest.display(), "Composer installed");
            Ok::<_, Error>((version.to_string(), dest))
        }
        .await;
        self.finish_tool("composer", php, result, tracker)
    }

    /// Build and enable PECL extension `name` for installed PHP `php`.
    ///
    /// # Errors
    /// Returns [`Error::VersionNotInstalled`] if `php` is not usable,
    /// [`Error::BuildFailed`] if a build step fails, or any resolve or fetch
    /// error.
    pub async fn install_extension(
        &self,
        name: &str,
        spec: &str,
        php: &str,
        options: &InstallOptions,
    ) -> Result<ToolReport> {
        let name = name.to_ascii_lowercase();
        let target = format!("ext-{name}");
        let mut tracker = StateTracker::new(self.observer.clone());
        let result = async {
            let runtime = self.usable_php(php)?;
            tracker.enter(InstallState::Resolving);
            let class = ResourceClass::Extension(name.clone());
            let version = self.resolve(&class, spec).await?;
            let artifact = Artifact::extension(&name, &version.to_string());
            let entry = self.fetch(artifact.clone(), options, &mut tracker).await?;

            let source_dir = self.paths.build_dir().join(format!("{name}-{version}"));
            tracker.enter(InstallState::Unpacking);
            Self::unpack(&entry, &artifact, &source_dir).await?;

            tracker.enter(InstallState::Building);
            let steps = build::extension_steps(
                &source_dir,
                &runtime.install_path,
                self.settings.build.effective_jobs(),
            );
            let log = build::log_path(&self.paths.logs_dir(), &target, &version.to_string());
            let built = build::run_steps(self.runner.as_ref(), &target, &steps, &log).await;
            if !options.keep_source {
                if let Err(e) = remove_dir_if_present(&source_dir).await {
                    warn!(path = %source_dir.display(), error = %e, "could not remove source tree");
                }
            }
            built?;

            tracker.enter(InstallState::Registering);
            let ini = enable_extension(&runtime.install_path, &name)?;
            info!(extension = %name, version = %version, php, "extension installed");
            Ok::<_, Error>((version.to_string(), ini))
        }
        .await;
        self.finish_tool(&target, php, result, tracker)
    }

    fn finish_tool(
        &self,
        target: &str,
        php: &str,
        result: Result<(String, PathBuf)>,
        mut tracker: StateTracker,
    ) -> Result<ToolReport> {
        match result {
            Ok((version, path)) => {
                tracker.enter(InstallState::Done);
                Ok(ToolReport {
                    target: target.to_string(),
                    version,
                    php: php.to_string(),
                    path,
                    history: tracker.history,
                })
            }
            Err(e) => {
                tracker.fail(&e);
                Err(e)
            }
        }
    }

    /// Remove an installed version.
    ///
    /// # Errors
    /// See [`VersionRegistry::remove`].
    pub fn remove(&self, version: &str, force: bool) -> Result<Removal> {
        self.registry()?.remove(version, force)
    }

    /// Install each spec independently.
    pub async fn batch_install(
        &self,
        specs: &[String],
        options: &InstallOptions,
    ) -> BTreeMap<String, Result<InstallReport>> {
        let mut results = BTreeMap::new();
        for spec in specs {
            let result = self.install(spec, options).await;
            if let Err(e) = &result {
                warn!(spec = %spec, error = %e, "batch install item failed");
            }
            results.insert(spec.clone(), result);
        }
        results
    }

    /// Remove each version independently.
    #[must_use]
    pub fn batch_remove(&self, versions: &[String], force: bool) -> BTreeMap<String, Result<Removal>> {
        let mut results = BTreeMap::new();
        for version in versions {
            let result = self.remove(version, force);
            if let Err(e) = &result {
                warn!(version = %version, error = %e, "batch remove item failed");
            }
            results.insert(version.clone(), result);
        }
        results
    }
}

async fn remove_dir_if_present(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(dir, e)),
    }
}

async fn move_contents(from: &Path, to: &Path) -> Result<()> {
    tokio::fs::create_dir_all(to)
        .await
        .map_err(|e| Error::io(to, e))?;
    let mut entries = tokio::fs::read_dir(from)
        .await
        .map_err(|e| Error::io(from, e))?;
    while let Some(entry) = entries.next_entry().await.map_err(|e| Error::io(from, e))? {
        let dest = to.join(entry.file_name());
        tokio::fs::rename(entry.path(), &dest)
            .await
            .map_err(|e| Error::io(&dest, e))?;
    }
    Ok(())
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|e| Error::io(path, e))
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Write `etc/conf.d/<name>.ini` loading the extension.
fn enable_extension(prefix: &Path, name: &str) -> Result<PathBuf> {
    let directive = if ZEND_EXTENSIONS.contains(&name) {
        "zend_extension"
    } else {
        "extension"
    };
    let ini = prefix.join("etc").join("conf.d").join(format!("{name}.ini"));
    overture_core::write_atomic(&ini, format!("{directive}={name}\n").as_bytes())?;
    Ok(ini)
}
