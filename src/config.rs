use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PRIMARY_URL: &str = "https://127.0.0.1:27124";
pub const DEFAULT_FALLBACK_URL: &str = "http://127.0.0.1:27123";
pub const DEFAULT_VAULT_PATH: &str = "0. 目标及计划/Daily";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

const STORE_FILE: &str = "store.json";

/// Directory holding the local store. `TASKSBOARD_DATA_DIR` overrides the
/// platform default.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("TASKSBOARD_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("tasksboard")
}

pub fn store_path() -> PathBuf {
    data_dir().join(STORE_FILE)
}

fn default_vault_path() -> String {
    DEFAULT_VAULT_PATH.to_string()
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_debounce() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_primary_url() -> String {
    DEFAULT_PRIMARY_URL.to_string()
}

fn default_fallback_url() -> String {
    DEFAULT_FALLBACK_URL.to_string()
}

fn default_true() -> bool {
    true
}

/// Settings for the Obsidian Local REST API connection, stored under
/// `syncConfig`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(default)]
    pub sync_enabled: bool,
    /// Bearer token issued by the REST plugin.
    #[serde(default)]
    pub api_key: String,
    /// Folder inside the vault holding one note per day.
    #[serde(default = "default_vault_path")]
    pub vault_path: String,
    /// Poll interval in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Quiet period in milliseconds before a local edit is pushed.
    #[serde(default = "default_debounce")]
    pub debounce: u64,
    #[serde(default = "default_primary_url")]
    pub primary_url: String,
    #[serde(default = "default_fallback_url")]
    pub fallback_url: String,
    /// The plugin serves HTTPS with a self-signed certificate.
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_enabled: false,
            api_key: String::new(),
            vault_path: default_vault_path(),
            poll_interval: DEFAULT_POLL_INTERVAL_MS,
            debounce: DEFAULT_DEBOUNCE_MS,
            primary_url: default_primary_url(),
            fallback_url: default_fallback_url(),
            accept_invalid_certs: true,
        }
    }
}

impl SyncConfig {
    /// Sync runs only when switched on and a credential is present.
    pub fn is_active(&self) -> bool {
        self.sync_enabled && !self.api_key.trim().is_empty()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval.max(1))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce)
    }

    /// Base URLs in the order they are probed.
    pub fn endpoints(&self) -> [&str; 2] {
        [self.primary_url.as_str(), self.fallback_url.as_str()]
    }
}

/// Display toggles, stored under `preferences`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub completed_section_expanded: bool,
    pub debug_logging: bool,
}
