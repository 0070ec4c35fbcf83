//! Official upstream locations.

use overture_core::ResourceClass;

/// Official PHP distributions.
pub const PHP_DISTRIBUTIONS: &str = "https://www.php.net/distributions";
/// Official PECL downloads.
pub const PECL_DOWNLOADS: &str = "https://pecl.php.net/get";
/// Official Composer downloads.
pub const COMPOSER_DOWNLOADS: &str = "https://getcomposer.org/download";

/// Upstream base URL per resource class.
///
/// Overridable so tests can point the "official" upstream at a local server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfficialUpstreams {
    /// PHP source and binaries.
    pub php: String,
    /// PECL and extensions.
    pub pecl: String,
    /// Composer.
    pub composer: String,
}

impl Default for OfficialUpstreams {
    fn default() -> Self {
        Self {
            php: PHP_DISTRIBUTIONS.to_string(),
            pecl: PECL_DOWNLOADS.to_string(),
            composer: COMPOSER_DOWNLOADS.to_string(),
        }
    }
}

impl OfficialUpstreams {
    /// Base URL serving `class`.
    #[must_use]
    pub fn for_class(&self, class: &ResourceClass) -> &str {
        match class {
            ResourceClass::Php => &self.php,
            ResourceClass::Pecl | ResourceClass::Extension(_) => &self.pecl,
            ResourceClass::Composer => &self.composer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_come_from_pecl() {
        let o = OfficialUpstreams::default();
        assert_eq!(
            o.for_class(&ResourceClass::Extension("redis".into())),
            PECL_DOWNLOADS
        );
        assert_eq!(o.for_class(&ResourceClass::Php), PHP_DISTRIBUTIONS);
    }
}
