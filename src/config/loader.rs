//! Configuration loading and saving
//!
//! The file is plain JSON. A missing or broken file is never fatal: the
//! defaults are used and the problem is logged.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use super::defaults::{APP_DIR_NAME, CONFIG_FILE_NAME};
use super::types::Config;
use crate::error::{HistoryError, Result};

/// `<config_dir>/cliptrail/config.json`, falling back to the home directory.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
        .join(CONFIG_FILE_NAME)
}

/// `<data_dir>/cliptrail`, holding the database, images and logs.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}

/// Load configuration from `path`.
///
/// Returns `Config::default()` if the file does not exist or fails to parse.
/// Fields missing from the file keep their default values.
#[instrument(name = "load_config", skip_all, fields(path = %path.display()))]
pub fn load_config(path: &Path) -> Config {
    if !path.exists() {
        info!("Config file not found, using defaults");
        return Config::default();
    }

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Failed to read config file, using defaults");
            return Config::default();
        }
    };

    match serde_json::from_str::<Config>(&raw) {
        Ok(config) => {
            info!(
                max_entries = config.max_entries,
                max_age_days = config.max_age_days,
                blacklisted = config.blacklisted_apps.len(),
                "Successfully loaded config"
            );
            config
        }
        Err(e) => {
            warn!(error = %e, "Failed to parse config JSON, using defaults");
            Config::default()
        }
    }
}

/// Write the configuration as pretty-printed JSON, creating parent directories.
pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json =
        serde_json::to_string_pretty(config).map_err(|e| HistoryError::Config(e.to_string()))?;
    fs::write(path, json)?;
    info!(path = %path.display(), "Saved config");
    Ok(())
}
