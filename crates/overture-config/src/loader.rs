//! Loading and saving `config.json`.

use crate::env::EnvConfig;
use crate::error::{ConfigError, Result};
use crate::settings::Settings;
use std::path::Path;
use tracing::debug;

/// Load settings from `path`, apply environment overrides and validate.
///
/// A missing file yields defaults.
///
/// # Errors
/// Returns error if the file is unreadable, malformed or out of range.
pub fn load_settings(path: &Path, env: &EnvConfig) -> Result<Settings> {
    let mut settings = match std::fs::read(path) {
        Ok(bytes) => sonic_rs::from_slice(&bytes).map_err(|e| ConfigError::json(path, &e))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file, using defaults");
            Settings::default()
        }
        Err(e) => return Err(ConfigError::io(path, e)),
    };
    env.apply_to(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Validate and atomically persist settings.
///
/// # Errors
/// Returns error if validation or the write fails.
pub fn save_settings(path: &Path, settings: &Settings) -> overture_core::Result<()> {
    settings.validate()?;
    overture_core::write_json_file(path, settings)
}
