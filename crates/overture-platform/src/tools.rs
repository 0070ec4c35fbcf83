//! Build prerequisite probing.

use std::fmt;
use tracing::debug;

/// A tool needed to compile PHP or an extension from source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildTool {
    /// A C compiler.
    CCompiler,
    /// GNU make.
    Make,
    /// autoconf (phpize needs it).
    Autoconf,
    /// Parser generator.
    Bison,
    /// Lexer generator.
    Re2c,
    /// pkg-config.
    PkgConfig,
}

impl BuildTool {
    /// Every required tool.
    pub const ALL: [Self; 6] = [
        Self::CCompiler,
        Self::Make,
        Self::Autoconf,
        Self::Bison,
        Self::Re2c,
        Self::PkgConfig,
    ];

    /// Executables any one of which satisfies the tool.
    #[must_use]
    pub const fn executables(self) -> &'static [&'static str] {
        match self {
            Self::CCompiler => &["cc", "gcc", "clang"],
            Self::Make => &["make", "gmake"],
            Self::Autoconf => &["autoconf"],
            Self::Bison => &["bison"],
            Self::Re2c => &["re2c"],
            Self::PkgConfig => &["pkg-config", "pkgconf"],
        }
    }

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CCompiler => "cc",
            Self::Make => "make",
            Self::Autoconf => "autoconf",
            Self::Bison => "bison",
            Self::Re2c => "re2c",
            Self::PkgConfig => "pkg-config",
        }
    }
}

impl fmt::Display for BuildTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tools missing from `PATH`.
#[must_use]
pub fn probe_build_tools() -> Vec<BuildTool> {
    missing_build_tools(crate::has_executable)
}

/// Tools missing according to a custom executable probe.
pub fn missing_build_tools(mut exists: impl FnMut(&str) -> bool) -> Vec<BuildTool> {
    let missing: Vec<BuildTool> = BuildTool::ALL
        .into_iter()
        .filter(|tool| !tool.executables().iter().any(|exe| exists(exe)))
        .collect();
    debug!(?missing, "build tool probe");
    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_alternative_satisfies_a_tool() {
        let missing = missing_build_tools(|exe| matches!(exe, "clang" | "gmake" | "pkgconf"));
        assert_eq!(
            missing,
            vec![BuildTool::Autoconf, BuildTool::Bison, BuildTool::Re2c]
        );
    }

    #[test]
    fn nothing_missing_when_all_present() {
        assert!(missing_build_tools(|_| true).is_empty());
    }
}
