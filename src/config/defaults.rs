//! Default configuration values
//!
//! All constants used throughout the config module are defined here.

/// Default global shortcut (Ctrl+Alt+V)
pub const DEFAULT_HOTKEY_MODIFIERS: &[&str] = &["ctrl", "alt"];
pub const DEFAULT_HOTKEY_KEY: &str = "v";

/// Default retention limits
pub const DEFAULT_MAX_ENTRIES: usize = 5000;
pub const DEFAULT_MAX_STORAGE_MB: u64 = 500;
pub const DEFAULT_MAX_AGE_DAYS: i64 = 90;
pub const DEFAULT_CLEANUP_INTERVAL_MINUTES: u64 = 30;

pub const DEFAULT_DEDUPLICATE_CONSECUTIVE: bool = true;

/// Password managers opt out of capture by default.
pub const DEFAULT_BLACKLISTED_APPS: &[&str] = &["KeePass.exe", "1Password.exe"];

pub const APP_DIR_NAME: &str = "cliptrail";
pub const CONFIG_FILE_NAME: &str = "config.json";
