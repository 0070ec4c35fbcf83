//! Operating system and architecture detection.

use once_cell::sync::Lazy;
use std::fmt;
use std::path::PathBuf;

static CURRENT: Lazy<Platform> = Lazy::new(Platform::detect);

/// Operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    /// Linux.
    Linux,
    /// macOS.
    MacOs,
    /// Windows.
    Windows,
    /// Anything else.
    Other,
}

impl Os {
    /// Short name used in prebuilt artifact file names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::MacOs => "darwin",
            Self::Windows => "windows",
            Self::Other => "unknown",
        }
    }
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    /// 64-bit x86.
    X86_64,
    /// 64-bit ARM.
    Aarch64,
    /// Anything else.
    Other,
}

impl Arch {
    /// Short name used in prebuilt artifact file names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
            Self::Other => "unknown",
        }
    }
}

/// The host platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// Operating system.
    pub os: Os,
    /// Architecture.
    pub arch: Arch,
    /// Available logical CPUs.
    pub cpus: usize,
}

impl Platform {
    /// The process-wide detected platform.
    #[must_use]
    pub fn current() -> &'static Self {
        &CURRENT
    }

    fn detect() -> Self {
        let os = match std::env::consts::OS {
            "linux" => Os::Linux,
            "macos" => Os::MacOs,
            "windows" => Os::Windows,
            _ => Os::Other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => Arch::X86_64,
            "aarch64" => Arch::Aarch64,
            _ => Arch::Other,
        };
        let cpus = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self { os, arch, cpus }
    }

    /// Target name for prebuilt binaries, e.g. `linux-x86_64`.
    #[must_use]
    pub fn target(&self) -> String {
        format!("{}-{}", self.os.as_str(), self.arch.as_str())
    }

    /// Whether prebuilt binaries can exist for this host.
    #[must_use]
    pub const fn supports_prebuilt(&self) -> bool {
        !matches!(self.os, Os::Other) && !matches!(self.arch, Arch::Other)
    }

    /// Default Overture home when `OVERTURE_HOME` is unset.
    #[must_use]
    pub fn default_home(&self) -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "overture").map(|d| d.data_dir().to_path_buf())
    }

    /// The user's home directory.
    #[must_use]
    pub fn user_home(&self) -> Option<PathBuf> {
        directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} cpus)", self.target(), self.cpus)
    }
}

/// Whether the process runs with root privileges.
#[must_use]
pub fn is_elevated() -> bool {
    #[cfg(unix)]
    {
        std::process::Command::new("id")
            .arg("-u")
            .output()
            .ok()
            .filter(|o| o.status.success())
            .is_some_and(|o| String::from_utf8_lossy(&o.stdout).trim() == "0")
    }
    #[cfg(not(unix))]
    {
        false
    }
}
