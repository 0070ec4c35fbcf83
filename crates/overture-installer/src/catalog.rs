//! Release catalogs: which versions exist upstream.

use async_trait::async_trait;
use overture_core::{Artifact, Error, ResourceClass, Result};
use overture_downloader::{HttpClient, ReferenceSource};
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};
use url::Url;

/// Official php.net site.
pub const PHP_NET: &str = "https://www.php.net";
/// Official Composer site.
pub const COMPOSER_SITE: &str = "https://getcomposer.org";
/// Official PECL site.
pub const PECL_SITE: &str = "https://pecl.php.net";

/// Lists installable versions for a resource class.
#[async_trait]
pub trait VersionCatalog: Send + Sync {
    /// Short name for diagnostics.
    fn name(&self) -> &str;

    /// Whether this catalog knows `class`.
    fn supports(&self, class: &ResourceClass) -> bool;

    /// Known versions for `class`, in no particular order.
    ///
    /// # Errors
    /// Returns error if the index cannot be fetched or parsed.
    async fn versions(&self, class: &ResourceClass) -> Result<Vec<String>>;
}

fn endpoint(base: &str, path: &str) -> Result<Url> {
    let raw = format!("{}{path}", base.trim_end_matches('/'));
    Url::parse(&raw).map_err(|e| Error::network(e.to_string(), Some(raw)))
}

async fn fetch_text(client: &HttpClient, url: &Url) -> Result<String> {
    read_text(client.get(url).await?, url).await
}

async fn read_text(response: reqwest::Response, url: &Url) -> Result<String> {
    response
        .text()
        .await
        .map_err(|e| Error::network(e.to_string(), Some(url.to_string())))
}

#[derive(Debug, Deserialize)]
struct PhpRelease {
    #[serde(default)]
    source: Vec<PhpSourceFile>,
}

#[derive(Debug, Deserialize)]
struct PhpSourceFile {
    filename: String,
    #[serde(default)]
    sha256: Option<String>,
}

/// The php.net releases index.
///
/// Also serves as the reference checksum source for PHP source tarballs.
#[derive(Debug, Clone)]
pub struct PhpNetCatalog {
    client: HttpClient,
    base: String,
    majors: Vec<u64>,
}

impl PhpNetCatalog {
    /// Query `base` (normally [`PHP_NET`]) for PHP 8 and 7 releases.
    #[must_use]
    pub fn new(client: HttpClient, base: impl Into<String>) -> Self {
        Self {
            client,
            base: base.into(),
            majors: vec![8, 7],
        }
    }

    /// Major release lines to list.
    #[must_use]
    pub fn with_majors(mut self, majors: Vec<u64>) -> Self {
        self.majors = majors;
        self
    }

    async fn releases_for(&self, major: u64) -> Result<BTreeMap<String, PhpRelease>> {
        let url = endpoint(
            &self.base,
            &format!("/releases/index.php?json&max=1000&version={major}"),
        )?;
        let body = fetch_text(&self.client, &url).await?;
        overture_core::from_json(&body)
    }
}

#[async_trait]
impl VersionCatalog for PhpNetCatalog {
    fn name(&self) -> &str {
        "php.net"
    }

    fn supports(&self, class: &ResourceClass) -> bool {
        *class == ResourceClass::Php
    }

    async fn versions(&self, class: &ResourceClass) -> Result<Vec<String>> {
        if !self.supports(class) {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for major in &self.majors {
            let releases = self.releases_for(*major).await?;
            debug!(major, count = releases.len(), "php.net releases");
            out.extend(releases.into_keys());
        }
        Ok(out)
    }
}

#[async_trait]
impl ReferenceSource for PhpNetCatalog {
    fn name(&self) -> &str {
        "php.net"
    }

    async fn sha256_for(&self, artifact: &Artifact) -> Result<Option<String>> {
        if artifact.class != ResourceClass::Php {
            return Ok(None);
        }
        let url = endpoint(
            &self.base,
            &format!("/releases/index.php?json&version={}", artifact.version),
        )?;
        let body = fetch_text(&self.client, &url).await?;
        let release: PhpRelease = overture_core::from_json(&body)?;
        Ok(release
            .source
            .into_iter()
            .find(|f| f.filename == artifact.file_name)
            .and_then(|f| f.sha256)
            .map(|s| s.to_ascii_lowercase()))
    }
}

#[derive(Debug, Deserialize)]
struct ComposerChannelEntry {
    version: String,
}

/// Composer's `/versions` index.
#[derive(Debug, Clone)]
pub struct ComposerCatalog {
    client: HttpClient,
    base: String,
}

impl ComposerCatalog {
    /// Query `base` (normally [`COMPOSER_SITE`]).
    #[must_use]
    pub fn new(client: HttpClient, base: impl Into<String>) -> Self {
        Self {
            client,
            base: base.into(),
        }
    }
}

#[async_trait]
impl VersionCatalog for ComposerCatalog {
    fn name(&self) -> &str {
        "getcomposer.org"
    }

    fn supports(&self, class: &ResourceClass) -> bool {
        *class == ResourceClass::Composer
    }

    async fn versions(&self, class: &ResourceClass) -> Result<Vec<String>> {
        if !self.supports(class) {
            return Ok(Vec::new());
        }
        let url = endpoint(&self.base, "/versions")?;
        let body = fetch_text(&self.client, &url).await?;
        let channels: HashMap<String, Vec<ComposerChannelEntry>> = overture_core::from_json(&body)?;
        let mut out: Vec<String> = channels
            .into_iter()
            .filter(|(channel, _)| channel != "snapshot" && channel != "preview")
            .flat_map(|(_, entries)| entries.into_iter().map(|e| e.version))
            .collect();
        out.sort();
        out.dedup();
        Ok(out)
    }
}

static PECL_RELEASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<r>\s*<v>([^<]+)</v>\s*<s>([^<]+)</s>").unwrap());

/// Stable versions listed in a PECL `allreleases.xml` document.
#[must_use]
pub fn parse_pecl_releases(xml: &str) -> Vec<String> {
    PECL_RELEASE
        .captures_iter(xml)
        .filter(|c| c[2].trim() == "stable")
        .map(|c| c[1].trim().to_string())
        .collect()
}

/// The PECL REST index.
#[derive(Debug, Clone)]
pub struct PeclCatalog {
    client: HttpClient,
    base: String,
}

impl PeclCatalog {
    /// Query `base` (normally [`PECL_SITE`]).
    #[must_use]
    pub fn new(client: HttpClient, base: impl Into<String>) -> Self {
        Self {
            client,
            base: base.into(),
        }
    }
}

#[async_trait]
impl VersionCatalog for PeclCatalog {
    fn name(&self) -> &str {
        "pecl.php.net"
    }

    fn supports(&self, class: &ResourceClass) -> bool {
        matches!(class, ResourceClass::Extension(_))
    }

    async fn versions(&self, class: &ResourceClass) -> Result<Vec<String>> {
        let ResourceClass::Extension(name) = class else {
            return Ok(Vec::new());
        };
        let url = endpoint(&self.base, &format!("/rest/r/{name}/allreleases.xml"))?;
        match self.client.get(&url).await {
            Ok(response) => Ok(parse_pecl_releases(&read_text(response, &url).await?)),
            Err(e) if e.is_not_found() => {
                warn!(extension = %name, "extension not found on PECL");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Fixed version lists, for offline use and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    versions: HashMap<String, Vec<String>>,
}

impl StaticCatalog {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the versions listed for `class`.
    #[must_use]
    pub fn with(mut self, class: &ResourceClass, versions: &[&str]) -> Self {
        self.versions.insert(
            class.key(),
            versions.iter().map(|v| (*v).to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl VersionCatalog for StaticCatalog {
    fn name(&self) -> &str {
        "static"
    }

    fn supports(&self, class: &ResourceClass) -> bool {
        self.versions.contains_key(&class.key())
    }

    async fn versions(&self, class: &ResourceClass) -> Result<Vec<String>> {
        Ok(self.versions.get(&class.key()).cloned().unwrap_or_default())
    }
}

/// Routes each class to the first catalog that supports it.
#[derive(Clone, Default)]
pub struct CatalogSet {
    catalogs: Vec<Arc<dyn VersionCatalog>>,
}

impl std::fmt::Debug for CatalogSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.catalogs.iter().map(|c| c.name()))
            .finish()
    }
}

impl CatalogSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a catalog.
    #[must_use]
    pub fn with(mut self, catalog: Arc<dyn VersionCatalog>) -> Self {
        self.catalogs.push(catalog);
        self
    }
}

#[async_trait]
impl VersionCatalog for CatalogSet {
    fn name(&self) -> &str {
        "catalogs"
    }

    fn supports(&self, class: &ResourceClass) -> bool {
        self.catalogs.iter().any(|c| c.supports(class))
    }

    async fn versions(&self, class: &ResourceClass) -> Result<Vec<String>> {
        match self.catalogs.iter().find(|c| c.supports(class)) {
            Some(catalog) => catalog.versions(class).await,
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overture_core::PhpVersion;
    use overture_test_utils::{MockMirror, php_releases_json};
    use pretty_assertions::assert_eq;

    fn client() -> HttpClient {
        HttpClient::with_defaults().unwrap()
    }

    #[tokio::test]
    async fn php_net_lists_each_major() {
        let site = MockMirror::start().await;
        site.serve_text_for_query(
            "/releases/index.php",
            "version",
            "8",
            php_releases_json(&[
                ("8.1.2", "php-8.1.2.tar.gz", "aa"),
                ("8.1.27", "php-8.1.27.tar.gz", "bb"),
            ]),
        )
        .await;
        site.serve_text_for_query(
            "/releases/index.php",
            "version",
            "7",
            php_releases_json(&[("7.4.33", "php-7.4.33.tar.gz", "cc")]),
        )
        .await;

        let catalog = PhpNetCatalog::new(client(), site.url());
        let mut versions = catalog.versions(&ResourceClass::Php).await.unwrap();
        versions.sort();
        assert_eq!(versions, vec!["7.4.33", "8.1.2", "8.1.27"]);
        assert!(catalog.versions(&ResourceClass::Composer).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn php_net_supplies_source_checksums() {
        let site = MockMirror::start().await;
        site.serve_text_for_query(
            "/releases/index.php",
            "version",
            "8.3.4",
            r#"{"version":"8.3.4","source":[
                {"filename":"php-8.3.4.tar.bz2","sha256":"11"},
                {"filename":"php-8.3.4.tar.gz","sha256":"ABCDEF"}
            ]}"#,
        )
        .await;
        let catalog = PhpNetCatalog::new(client(), site.url());
        let artifact = Artifact::php_source(&PhpVersion::new(8, 3, 4));
        assert_eq!(
            catalog.sha256_for(&artifact).await.unwrap().as_deref(),
            Some("abcdef")
        );
        let prebuilt = Artifact::php_prebuilt(&PhpVersion::new(8, 3, 4), "linux-x86_64");
        assert_eq!(catalog.sha256_for(&prebuilt).await.unwrap(), None);
    }

    #[tokio::test]
    async fn composer_versions_skip_unstable_channels() {
        let site = MockMirror::start().await;
        site.serve_text(
            "/versions",
            r#"{
                "stable": [{"path": "/download/2.7.1/composer.phar", "version": "2.7.1", "min-php": 72}],
                "preview": [{"path": "/download/2.8.0-RC1/composer.phar", "version": "2.8.0-RC1", "min-php": 72}],
                "snapshot": [{"path": "/composer.phar", "version": "abc123", "min-php": 72}],
                "2": [{"path": "/download/2.7.1/composer.phar", "version": "2.7.1", "min-php": 72}],
                "2.2": [{"path": "/download/2.2.23/composer.phar", "version": "2.2.23", "min-php": 53}]
            }"#,
        )
        .await;
        let catalog = ComposerCatalog::new(client(), site.url());
        let versions = catalog.versions(&ResourceClass::Composer).await.unwrap();
        assert_eq!(versions, vec!["2.2.23", "2.7.1"]);
    }

    #[test]
    fn pecl_xml_keeps_stable_releases() {
        let xml = r"<a><p>redis</p>
            <r><v>6.1.0RC1</v><s>beta</s></r>
            <r><v>6.0.2</v><s>stable</s></r>
            <r>
              <v>5.3.7</v>
              <s>stable</s>
            </r></a>";
        assert_eq!(parse_pecl_releases(xml), vec!["6.0.2", "5.3.7"]);
    }

    #[tokio::test]
    async fn catalog_set_routes_by_class() {
        let php = StaticCatalog::new().with(&ResourceClass::Php, &["8.3.4"]);
        let composer = StaticCatalog::new().with(&ResourceClass::Composer, &["2.7.1"]);
        let set = CatalogSet::new().with(Arc::new(php)).with(Arc::new(composer));
        assert_eq!(set.versions(&ResourceClass::Composer).await.unwrap(), vec!["2.7.1"]);
        assert!(!set.supports(&ResourceClass::Extension("redis".into())));
        assert!(set
            .versions(&ResourceClass::Extension("redis".into()))
            .await
            .unwrap()
            .is_empty());
    }
}
