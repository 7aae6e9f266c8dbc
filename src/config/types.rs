//! Configuration type definitions

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::defaults::*;

/// Live configuration handle shared by the running components.
///
/// Settings saved at runtime are written through this handle; the retention
/// manager re-reads it every cycle.
pub type SharedConfig = Arc<RwLock<Config>>;

/// Global shortcut description: modifier names plus a key name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotkeyConfig {
    pub modifiers: Vec<String>,
    pub key: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        HotkeyConfig {
            modifiers: DEFAULT_HOTKEY_MODIFIERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            key: DEFAULT_HOTKEY_KEY.to_string(),
        }
    }
}

impl HotkeyConfig {
    /// Human-readable form for logs, e.g. "ctrl+alt+v".
    pub fn display(&self) -> String {
        let mut parts: Vec<String> = self.modifiers.iter().map(|m| m.to_lowercase()).collect();
        parts.push(self.key.to_lowercase());
        parts.join("+")
    }
}

/// Settings consumed by the capture core.
///
/// Every field falls back to its default when absent from the file, so a
/// partial config merges over the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub hotkey: HotkeyConfig,
    pub max_entries: usize,
    /// Informational only; reported by `stats`, never enforced.
    pub max_storage_mb: u64,
    /// Zero or negative disables age-based eviction.
    pub max_age_days: i64,
    pub cleanup_interval_minutes: u64,
    pub deduplicate_consecutive: bool,
    pub blacklisted_apps: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            hotkey: HotkeyConfig::default(),
            max_entries: DEFAULT_MAX_ENTRIES,
            max_storage_mb: DEFAULT_MAX_STORAGE_MB,
            max_age_days: DEFAULT_MAX_AGE_DAYS,
            cleanup_interval_minutes: DEFAULT_CLEANUP_INTERVAL_MINUTES,
            deduplicate_consecutive: DEFAULT_DEDUPLICATE_CONSECUTIVE,
            blacklisted_apps: DEFAULT_BLACKLISTED_APPS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Config {
    pub fn into_shared(self) -> SharedConfig {
        Arc::new(RwLock::new(self))
    }

    /// Age eviction is enabled only for a positive day count.
    pub fn max_age(&self) -> Option<chrono::Duration> {
        (self.max_age_days > 0).then(|| chrono::Duration::days(self.max_age_days))
    }

    /// Cleanup interval, never shorter than one minute.
    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_minutes.max(1) * 60)
    }
}
