//! OS package-manager detection.

use crate::BuildTool;
use std::fmt;
use tracing::debug;

/// A supported system package manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageManager {
    /// Debian/Ubuntu.
    Apt,
    /// Fedora/RHEL 8+.
    Dnf,
    /// Older RHEL/CentOS.
    Yum,
    /// Arch.
    Pacman,
    /// openSUSE.
    Zypper,
    /// Alpine.
    Apk,
    /// Homebrew.
    Brew,
}

impl PackageManager {
    /// Probe order; first match wins.
    pub const ALL: [Self; 7] = [
        Self::Apt,
        Self::Dnf,
        Self::Yum,
        Self::Pacman,
        Self::Zypper,
        Self::Apk,
        Self::Brew,
    ];

    /// Executable name.
    #[must_use]
    pub const fn program(self) -> &'static str {
        match self {
            Self::Apt => "apt-get",
            Self::Dnf => "dnf",
            Self::Yum => "yum",
            Self::Pacman => "pacman",
            Self::Zypper => "zypper",
            Self::Apk => "apk",
            Self::Brew => "brew",
        }
    }

    /// Detect the host package manager by probing `PATH`.
    #[must_use]
    pub fn detect() -> Option<Self> {
        Self::detect_with(crate::has_executable)
    }

    /// Detect using a custom executable probe.
    pub fn detect_with(mut exists: impl FnMut(&str) -> bool) -> Option<Self> {
        let found = Self::ALL.into_iter().find(|pm| exists(pm.program()));
        debug!(manager = ?found, "package manager probe");
        found
    }

    /// Whether installs need root.
    #[must_use]
    pub const fn needs_root(self) -> bool {
        !matches!(self, Self::Brew)
    }

    /// Arguments (after the program) that install `packages` non-interactively.
    #[must_use]
    pub fn install_args(self, packages: &[String]) -> Vec<String> {
        let prefix: &[&str] = match self {
            Self::Apt => &["install", "-y"],
            Self::Dnf | Self::Yum => &["install", "-y"],
            Self::Pacman => &["-S", "--noconfirm", "--needed"],
            Self::Zypper => &["--non-interactive", "install"],
            Self::Apk => &["add", "--no-cache"],
            Self::Brew => &["install"],
        };
        prefix
            .iter()
            .map(|s| (*s).to_string())
            .chain(packages.iter().cloned())
            .collect()
    }

    /// Package providing a build tool.
    #[must_use]
    pub const fn package_for(self, tool: BuildTool) -> &'static str {
        match (self, tool) {
            (Self::Apt, BuildTool::CCompiler) => "build-essential",
            (Self::Pacman, BuildTool::CCompiler) => "base-devel",
            (Self::Apk, BuildTool::CCompiler) => "build-base",
            (Self::Brew, BuildTool::CCompiler) => "llvm",
            (_, BuildTool::CCompiler) => "gcc",
            (_, BuildTool::Make) => "make",
            (_, BuildTool::Autoconf) => "autoconf",
            (_, BuildTool::Bison) => "bison",
            (_, BuildTool::Re2c) => "re2c",
            (Self::Dnf | Self::Yum | Self::Zypper, BuildTool::PkgConfig) => "pkgconf-pkg-config",
            (Self::Apk | Self::Pacman, BuildTool::PkgConfig) => "pkgconf",
            (_, BuildTool::PkgConfig) => "pkg-config",
        }
    }

    /// Packages providing `tools`, deduplicated in order.
    #[must_use]
    pub fn packages_for(self, tools: &[BuildTool]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for tool in tools {
            let pkg = self.package_for(*tool).to_string();
            if !out.contains(&pkg) {
                out.push(pkg);
            }
        }
        out
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn detect_respects_probe_order() {
        let found = PackageManager::detect_with(|p| p == "yum" || p == "dnf");
        assert_eq!(found, Some(PackageManager::Dnf));
        assert_eq!(PackageManager::detect_with(|_| false), None);
    }

    #[rstest]
    #[case(PackageManager::Apt, vec!["install", "-y", "make"])]
    #[case(PackageManager::Pacman, vec!["-S", "--noconfirm", "--needed", "make"])]
    #[case(PackageManager::Apk, vec!["add", "--no-cache", "make"])]
    fn install_args_are_non_interactive(#[case] pm: PackageManager, #[case] expected: Vec<&str>) {
        assert_eq!(pm.install_args(&["make".to_string()]), expected);
    }

    #[test]
    fn packages_are_deduplicated() {
        let pkgs = PackageManager::Dnf.packages_for(&[
            BuildTool::CCompiler,
            BuildTool::Make,
            BuildTool::Make,
        ]);
        assert_eq!(pkgs, vec!["gcc".to_string(), "make".to_string()]);
    }

    #[test]
    fn brew_runs_unprivileged() {
        assert!(!PackageManager::Brew.needs_root());
        assert!(PackageManager::Apt.needs_root());
    }
}
