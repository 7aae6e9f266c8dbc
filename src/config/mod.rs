//! Configuration module - retention limits, blacklist and hotkey settings
//!
//! This module provides functionality for:
//! - Loading configuration from `<config_dir>/cliptrail/config.json`
//! - Default values for all settings
//! - A shared, live-updatable handle passed to running components
//! - Watching the config file so saved settings apply without restart
//!
//! # Module Structure
//!
//! - `defaults` - All default constant values
//! - `types` - Configuration struct definitions (Config, HotkeyConfig)
//! - `loader` - File system loading, saving and path resolution
//! - `watcher` - Debounced reload events for the config file

mod defaults;
mod loader;
mod types;
mod watcher;

pub use defaults::*;
pub use loader::{default_config_path, default_data_dir, load_config, save_config};
pub use types::{Config, HotkeyConfig, SharedConfig};
pub use watcher::{ConfigReloadEvent, ConfigWatcher};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
