//! Resource classes and downloadable artifact descriptors.

use crate::{Error, PhpVersion, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// The category an artifact belongs to. Selects the mirror set and the
/// verification rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ResourceClass {
    /// PHP source tarballs and prebuilt binaries.
    Php,
    /// PECL extension archives.
    Pecl,
    /// Composer phar.
    Composer,
    /// A named extension with its own mirror override.
    Extension(String),
}

impl ResourceClass {
    /// Textual key (`php`, `pecl`, `composer`, `ext:<name>`).
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Php => "php".to_string(),
            Self::Pecl => "pecl".to_string(),
            Self::Composer => "composer".to_string(),
            Self::Extension(name) => format!("ext:{name}"),
        }
    }

    /// Directory name used for on-disk layouts.
    #[must_use]
    pub fn dir_name(&self) -> String {
        match self {
            Self::Extension(name) => format!("ext-{name}"),
            other => other.key(),
        }
    }

    /// Class whose mirrors apply when this one has no record of its own.
    #[must_use]
    pub const fn fallback_class(&self) -> Option<Self> {
        match self {
            Self::Extension(_) => Some(Self::Pecl),
            _ => None,
        }
    }

    /// Whether the class holds extension archives.
    #[must_use]
    pub const fn is_extension(&self) -> bool {
        matches!(self, Self::Pecl | Self::Extension(_))
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for ResourceClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "php" => Ok(Self::Php),
            "pecl" => Ok(Self::Pecl),
            "composer" => Ok(Self::Composer),
            other => match other.strip_prefix("ext:") {
                Some(name) if is_valid_extension_name(name) => {
                    Ok(Self::Extension(name.to_ascii_lowercase()))
                }
                _ => Err(Error::invalid_option(
                    "resource class",
                    format!("'{other}' is not php, pecl, composer or ext:<name>"),
                )),
            },
        }
    }
}

impl From<ResourceClass> for String {
    fn from(class: ResourceClass) -> Self {
        class.key()
    }
}

impl TryFrom<String> for ResourceClass {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

fn is_valid_extension_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// A downloadable unit with a mirror-independent identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Artifact {
    /// Resource class.
    pub class: ResourceClass,
    /// Artifact version (PHP, extension or Composer release).
    pub version: String,
    /// File name as stored in the cache.
    pub file_name: String,
    /// Path relative to a mirror base URL.
    pub relative_path: String,
}

impl Artifact {
    /// PHP source tarball: `php-X.Y.Z.tar.gz`.
    #[must_use]
    pub fn php_source(version: &PhpVersion) -> Self {
        let file_name = format!("php-{version}.tar.gz");
        Self {
            class: ResourceClass::Php,
            version: version.to_string(),
            relative_path: file_name.clone(),
            file_name,
        }
    }

    /// Prebuilt PHP binary for a target such as `linux-x86_64`.
    #[must_use]
    pub fn php_prebuilt(version: &PhpVersion, target: &str) -> Self {
        let file_name = format!("php-{version}-{target}.tar.gz");
        Self {
            class: ResourceClass::Php,
            version: version.to_string(),
            relative_path: format!("binaries/{file_name}"),
            file_name,
        }
    }

    /// Extension archive: `<name>-<version>.tgz`.
    #[must_use]
    pub fn extension(name: &str, version: &str) -> Self {
        let name = name.to_ascii_lowercase();
        let file_name = format!("{name}-{version}.tgz");
        Self {
            class: ResourceClass::Extension(name),
            version: version.to_string(),
            relative_path: file_name.clone(),
            file_name,
        }
    }

    /// Composer phar for a release.
    #[must_use]
    pub fn composer(version: &str) -> Self {
        Self {
            class: ResourceClass::Composer,
            version: version.to_string(),
            file_name: "composer.phar".to_string(),
            relative_path: format!("{version}/composer.phar"),
        }
    }

    /// Full URL of this artifact on a mirror base.
    ///
    /// # Errors
    /// Returns [`Error::InvalidMirrorUrl`] if the base does not parse.
    pub fn url_on(&self, base: &str) -> Result<Url> {
        let mut normalized = base.trim_end_matches('/').to_string();
        normalized.push('/');
        let base = Url::parse(&normalized).map_err(|e| Error::InvalidMirrorUrl {
            url: base.to_string(),
            reason: e.to_string(),
        })?;
        base.join(&self.relative_path)
            .map_err(|e| Error::InvalidMirrorUrl {
                url: base.to_string(),
                reason: e.to_string(),
            })
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.class, self.version, self.file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("php", ResourceClass::Php)]
    #[case("pecl", ResourceClass::Pecl)]
    #[case("composer", ResourceClass::Composer)]
    #[case("ext:redis", ResourceClass::Extension("redis".into()))]
    #[case("ext:Xdebug", ResourceClass::Extension("xdebug".into()))]
    fn parses_class_keys(#[case] input: &str, #[case] expected: ResourceClass) {
        assert_eq!(input.parse::<ResourceClass>().unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("ext:")]
    #[case("ext:../etc")]
    #[case("python")]
    fn rejects_unknown_classes(#[case] input: &str) {
        assert!(input.parse::<ResourceClass>().is_err());
    }

    #[test]
    fn extension_falls_back_to_pecl() {
        let class = ResourceClass::Extension("redis".into());
        assert_eq!(class.fallback_class(), Some(ResourceClass::Pecl));
        assert_eq!(ResourceClass::Php.fallback_class(), None);
        assert_eq!(class.dir_name(), "ext-redis");
    }

    #[test]
    fn artifact_urls_join_on_mirror_base() {
        let v = PhpVersion::new(8, 1, 27);
        let src = Artifact::php_source(&v);
        assert_eq!(
            src.url_on("https://www.php.net/distributions").unwrap().as_str(),
            "https://www.php.net/distributions/php-8.1.27.tar.gz"
        );
        let bin = Artifact::php_prebuilt(&v, "linux-x86_64");
        assert_eq!(
            bin.url_on("https://mirror.example/php/").unwrap().as_str(),
            "https://mirror.example/php/binaries/php-8.1.27-linux-x86_64.tar.gz"
        );
        let composer = Artifact::composer("2.7.1");
        assert_eq!(
            composer.url_on("https://getcomposer.org/download").unwrap().as_str(),
            "https://getcomposer.org/download/2.7.1/composer.phar"
        );
    }

    #[test]
    fn class_serializes_as_key() {
        let json = sonic_rs::to_string(&ResourceClass::Extension("redis".into())).unwrap();
        assert_eq!(json, "\"ext:redis\"");
    }
}
