//! Configuration for Overture.
//!
//! Settings are read from `config.json` under the Overture home, then
//! environment overrides are applied, then the result is validated.

#![warn(clippy::all)]

mod env;
mod error;
mod loader;
mod paths;
mod settings;

pub use env::{EnvConfig, OvertureEnvVar};
pub use error::{ConfigError, Result};
pub use loader::{load_settings, save_settings};
pub use paths::OverturePaths;
pub use settings::{
    BuildSettings, DEFAULT_CONFIGURE_FLAGS, DownloadSettings, MAX_THREADS, Settings,
    SpeedTestSettings,
};
