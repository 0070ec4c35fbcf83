//! Host platform layer for Overture.
//!
//! - OS/architecture detection and the prebuilt-binary target name
//! - Default data/cache directories
//! - Package-manager detection for environment auto-repair
//! - Build prerequisite probing

#![warn(clippy::all)]

mod host;
mod package_manager;
mod tools;

pub use host::{Arch, Os, Platform, is_elevated};
pub use package_manager::PackageManager;
pub use tools::{BuildTool, missing_build_tools, probe_build_tools};

/// Whether `program` resolves on `PATH`.
#[must_use]
pub fn has_executable(program: &str) -> bool {
    which::which(program).is_ok()
}
