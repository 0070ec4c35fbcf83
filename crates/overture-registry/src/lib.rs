//! Installed PHP runtimes for Overture.
//!
//! - [`VersionRegistry`]: durable records, reconciliation with the filesystem,
//!   removal guarded by the global and project pointers
//! - [`pointer`]: `current`/`global` links and `.php-version` pins
//! - [`InstallMarker`]: pending-install markers that expose interrupted installs
//!
//! # Example
//!
//! ```no_run
//! use overture_config::OverturePaths;
//! use overture_registry::{SwitchScope, VersionRegistry};
//!
//! # fn main() -> overture_core::Result<()> {
//! let mut registry = VersionRegistry::open(OverturePaths::with_root("/opt/overture"))?;
//! for installed in registry.list() {
//!     println!("{} {}", installed.version, installed.status);
//! }
//! registry.switch("8.3.4", SwitchScope::Global)?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

mod marker;
pub mod pointer;
mod registry;
mod types;

pub use marker::{InstallMarker, MARKER_FILE};
pub use pointer::PIN_FILE;
pub use registry::VersionRegistry;
pub use types::{
    InstalledVersion, Removal, Resolved, Selection, SourceType, SwitchScope, VersionStatus,
    php_binary,
};
