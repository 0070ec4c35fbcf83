//! Installation engine for Overture.
//!
//! - [`InstallationPipeline`]: resolve, fetch, verify, unpack, build or place,
//!   register, optionally switch
//! - [`VersionCatalog`]: release indexes for PHP, Composer and PECL
//! - [`CommandRunner`]: streamed, argument-vector build subprocesses
//! - [`EnvironmentRepair`]: explicit installation of missing build tools
//!
//! # Example
//!
//! ```no_run
//! use overture_config::{OverturePaths, Settings};
//! use overture_installer::{InstallOptions, Upstreams, standard_pipeline};
//!
//! # async fn run() -> overture_core::Result<()> {
//! let paths = OverturePaths::with_root("/opt/overture");
//! let pipeline = standard_pipeline(paths, Settings::default(), &Upstreams::default(), true)?;
//! let report = pipeline.install("8.3", &InstallOptions::default()).await?;
//! println!("installed {} at {}", report.version, report.install_path.display());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod build;
pub mod catalog;
mod options;
mod pipeline;
mod repair;
mod setup;

pub use build::{BuildCommand, CommandOutcome, CommandRunner, ProcessRunner};
pub use catalog::{
    CatalogSet, ComposerCatalog, PeclCatalog, PhpNetCatalog, StaticCatalog, VersionCatalog,
};
pub use options::{InstallOptions, OPTION_KEYS};
pub use pipeline::{InstallReport, InstallState, InstallationPipeline, StateObserver, ToolReport};
pub use repair::{EnvironmentRepair, RepairReport};
pub use setup::{
    Upstreams, download_config, standard_catalog, standard_downloads, standard_pipeline,
};
