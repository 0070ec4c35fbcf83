//! PHP version parsing and partial-spec resolution.

use crate::{Error, Result};
use semver::{Comparator, Op, Prerelease, Version};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A concrete `X.Y.Z` PHP release.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhpVersion(Version);

impl PhpVersion {
    /// Create from components.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(Version::new(major, minor, patch))
    }

    /// Parse `X.Y.Z`, tolerating a leading `v` or `php-`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidVersionSpec`] unless the input has exactly three
    /// numeric components.
    pub fn parse(input: &str) -> Result<Self> {
        let raw = strip_prefixes(input);
        let parts = split_numeric(input, raw)?;
        match parts.as_slice() {
            [major, minor, patch] => Ok(Self::new(*major, *minor, *patch)),
            _ => Err(invalid(input, "expected a full X.Y.Z version")),
        }
    }

    /// Major component.
    #[must_use]
    pub const fn major(&self) -> u64 {
        self.0.major
    }

    /// Minor component.
    #[must_use]
    pub const fn minor(&self) -> u64 {
        self.0.minor
    }

    /// Patch component.
    #[must_use]
    pub const fn patch(&self) -> u64 {
        self.0.patch
    }

    /// The `X.Y` release line.
    #[must_use]
    pub fn minor_line(&self) -> String {
        format!("{}.{}", self.0.major, self.0.minor)
    }

    /// Underlying semver value.
    #[must_use]
    pub const fn as_semver(&self) -> &Version {
        &self.0
    }
}

impl fmt::Display for PhpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PhpVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for PhpVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PhpVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A user-supplied version request.
///
/// `8.1.27` is exact, `8.1` and `8` select the newest matching patch, and
/// `latest` the newest release overall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    /// Exactly this release.
    Exact(PhpVersion),
    /// Newest release matching a major or major.minor prefix.
    Partial(Comparator),
    /// Newest release.
    Latest,
}

impl VersionSpec {
    /// Parse a version request.
    ///
    /// # Errors
    /// Returns [`Error::InvalidVersionSpec`] for anything other than `X`,
    /// `X.Y`, `X.Y.Z` or `latest`.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("latest") {
            return Ok(Self::Latest);
        }
        let raw = strip_prefixes(trimmed);
        let parts = split_numeric(input, raw)?;
        let partial = |minor: Option<u64>| Comparator {
            op: Op::Exact,
            major: parts[0],
            minor,
            patch: None,
            pre: Prerelease::EMPTY,
        };
        match parts.len() {
            1 => Ok(Self::Partial(partial(None))),
            2 => Ok(Self::Partial(partial(Some(parts[1])))),
            3 => Ok(Self::Exact(PhpVersion::new(parts[0], parts[1], parts[2]))),
            _ => Err(invalid(input, "too many components")),
        }
    }

    /// Whether `version` satisfies this request.
    #[must_use]
    pub fn matches(&self, version: &PhpVersion) -> bool {
        match self {
            Self::Exact(v) => v == version,
            Self::Partial(cmp) => cmp.matches(version.as_semver()),
            Self::Latest => true,
        }
    }

    /// Select the newest matching version from `available`.
    #[must_use]
    pub fn resolve<'a>(
        &self,
        available: impl IntoIterator<Item = &'a PhpVersion>,
    ) -> Option<PhpVersion> {
        available
            .into_iter()
            .filter(|v| self.matches(v))
            .max()
            .cloned()
    }

    /// Like [`resolve`](Self::resolve), failing with [`Error::UnknownVersion`]
    /// that lists the newest available releases.
    ///
    /// # Errors
    /// Returns error when nothing matches.
    pub fn resolve_or_err(&self, available: &[PhpVersion]) -> Result<PhpVersion> {
        self.resolve(available).ok_or_else(|| {
            let mut newest: Vec<&PhpVersion> = available.iter().collect();
            newest.sort_unstable_by(|a, b| b.cmp(a));
            Error::UnknownVersion {
                spec: self.to_string(),
                available: newest.iter().take(5).map(ToString::to_string).collect(),
            }
        })
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(v) => write!(f, "{v}"),
            Self::Partial(cmp) => match cmp.minor {
                Some(minor) => write!(f, "{}.{minor}", cmp.major),
                None => write!(f, "{}", cmp.major),
            },
            Self::Latest => f.write_str("latest"),
        }
    }
}

impl FromStr for VersionSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn strip_prefixes(input: &str) -> &str {
    let s = input.trim();
    let s = s.strip_prefix("php-").unwrap_or(s);
    s.strip_prefix('v').unwrap_or(s)
}

fn split_numeric(original: &str, raw: &str) -> Result<Vec<u64>> {
    if raw.is_empty() {
        return Err(invalid(original, "empty version"));
    }
    raw.split('.')
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid(original, "components must be numeric"));
            }
            part.parse::<u64>()
                .map_err(|e| invalid(original, &e.to_string()))
        })
        .collect()
}

fn invalid(spec: &str, reason: &str) -> Error {
    Error::InvalidVersionSpec {
        spec: spec.to_string(),
        reason: reason.to_string(),
    }
}
