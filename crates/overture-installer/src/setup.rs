//! Production wiring of the pipeline.

use crate::catalog::{
    COMPOSER_SITE, CatalogSet, ComposerCatalog, PECL_SITE, PHP_NET, PeclCatalog, PhpNetCatalog,
};
use crate::pipeline::InstallationPipeline;
use overture_cache::ArtifactCache;
use overture_config::{OverturePaths, Settings};
use overture_core::Result;
use overture_downloader::{
    ComposerChecksums, CompositeReferences, DownloadConfig, DownloadManager, LocalManifest,
    ProgressTracker, SignatureVerifier,
};
use overture_mirror::{
    HttpProbe, MirrorRegistry, MirrorSettings, MirrorSpeedRanker, OfficialUpstreams,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Upstream sites the engine talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstreams {
    /// php.net, for the release index and source checksums.
    pub php_site: String,
    /// getcomposer.org, for the version index.
    pub composer_site: String,
    /// pecl.php.net, for extension release lists.
    pub pecl_site: String,
    /// Official download bases.
    pub downloads: OfficialUpstreams,
}

impl Default for Upstreams {
    fn default() -> Self {
        Self {
            php_site: PHP_NET.to_string(),
            composer_site: COMPOSER_SITE.to_string(),
            pecl_site: PECL_SITE.to_string(),
            downloads: OfficialUpstreams::default(),
        }
    }
}

/// Transfer settings with the mirror toggles applied.
///
/// The mirror timeout bounds every read and caps the connect timeout.
#[must_use]
pub fn download_config(settings: &Settings, mirrors: &MirrorSettings) -> DownloadConfig {
    let mut config = DownloadConfig::from_settings(settings);
    let timeout = Duration::from_secs(mirrors.timeout_secs);
    config.verify_ssl = mirrors.verify_ssl;
    config.read_timeout = timeout;
    config.connect_timeout = config.connect_timeout.min(timeout);
    config
}

/// Download manager with mirror ranking and checksum verification.
///
/// # Errors
/// Returns error if the cache, mirror file or checksum manifest cannot be
/// read, or the HTTP clients cannot be built.
pub fn standard_downloads(
    paths: &OverturePaths,
    settings: &Settings,
    upstreams: &Upstreams,
    progress: bool,
) -> Result<DownloadManager> {
    let mirrors = MirrorRegistry::load(paths.mirrors_file())?;
    let config = download_config(settings, mirrors.settings());

    let cache = Arc::new(ArtifactCache::at_path(paths.artifacts_dir())?);
    let downloads = DownloadManager::new(config, cache)?;
    let client = downloads.client().clone();

    let references = CompositeReferences::new()
        .with(Arc::new(LocalManifest::load(&paths.checksums_file())?))
        .with(Arc::new(PhpNetCatalog::new(client.clone(), &upstreams.php_site)))
        .with(Arc::new(ComposerChecksums::new(client, &upstreams.downloads.composer)));
    debug!(sources = ?references, "checksum sources");

    let probe = Arc::new(HttpProbe::new(mirrors.settings().verify_ssl)?);
    let ranker = MirrorSpeedRanker::new(probe, paths.speed_test_cache(), settings.speed_test.ttl_secs)
        .with_timeout(Duration::from_secs(settings.speed_test.timeout_secs))
        .with_concurrency(settings.speed_test.concurrency);

    Ok(downloads
        .with_ranker(ranker)
        .with_verifier(SignatureVerifier::new(Arc::new(references)))
        .with_progress(ProgressTracker::new(progress)))
}

/// Catalogs for PHP, Composer and PECL.
#[must_use]
pub fn standard_catalog(downloads: &DownloadManager, upstreams: &Upstreams) -> CatalogSet {
    let client = downloads.client().clone();
    CatalogSet::new()
        .with(Arc::new(PhpNetCatalog::new(client.clone(), &upstreams.php_site)))
        .with(Arc::new(ComposerCatalog::new(client.clone(), &upstreams.composer_site)))
        .with(Arc::new(PeclCatalog::new(client, &upstreams.pecl_site)))
}

/// Pipeline wired to the real network and build tools.
///
/// # Errors
/// See [`standard_downloads`]; also fails if the home layout cannot be created.
pub fn standard_pipeline(
    paths: OverturePaths,
    settings: Settings,
    upstreams: &Upstreams,
    progress: bool,
) -> Result<InstallationPipeline> {
    paths.ensure_dirs()?;
    let downloads = standard_downloads(&paths, &settings, upstreams, progress)?;
    let catalog = standard_catalog(&downloads, upstreams);
    Ok(
        InstallationPipeline::new(paths, settings, downloads, Arc::new(catalog))
            .with_official(upstreams.downloads.clone()),
    )
}
