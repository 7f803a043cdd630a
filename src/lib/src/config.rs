//! Configuration loading.
//!
//! Settings live in `modsync.toml` or, as a fallback, `modsync.json` in
//! the base directory. Keys are camelCase in both formats. When neither
//! file exists every value falls back to its default, which leaves the
//! manifest URL empty and the sync cycle unable to start.

use std::fs;
use std::path::Path;
use std::time::Duration;

use log::*;
use serde::Deserialize;

use crate::error::*;

pub const CONFIG_TOML: &str = "modsync.toml";
pub const CONFIG_JSON: &str = "modsync.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// URL of the manifest listing every artifact to cache.
    pub mod_list: String,
    /// Directory holding the downloaded artifacts, relative to the base
    /// directory.
    pub mod_dir: String,
    /// Public key ring file, relative to the base directory.
    pub key_ring_path: String,
    /// Key servers tried in order when fetching keys by id.
    pub key_servers: Vec<String>,
    /// Key ids to fetch from the key servers and merge into the trust
    /// store. Only ids the operator already intends to trust belong here.
    pub key_ids: Vec<String>,
    /// Cached copy of the manifest, relative to the base directory.
    pub local_mod_list: String,
    /// Reuse existing local artifacts without asking the remote side.
    /// Never applies to the manifest itself.
    pub prefer_local_cache: bool,
    /// Connection timeout in milliseconds.
    pub timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mod_list: String::new(),
            mod_dir: "synced_mods".to_string(),
            key_ring_path: "pub_key.asc".to_string(),
            key_servers: vec![],
            key_ids: vec![],
            local_mod_list: "mod_list.json".to_string(),
            prefer_local_cache: false,
            timeout: 15000,
        }
    }
}

impl Config {
    /// Load the configuration from `base_dir`, preferring TOML over JSON.
    pub fn load(base_dir: &Path) -> Result<Self, SyncError> {
        let toml_path = base_dir.join(CONFIG_TOML);
        let json_path = base_dir.join(CONFIG_JSON);
        if toml_path.exists() {
            info!("Reading configuration from {}", toml_path.display());
            let text = fs::read_to_string(&toml_path)?;
            toml::from_str(&text).map_err(|e| SyncError::Config(e.to_string()))
        } else if json_path.exists() {
            info!("Reading configuration from {}", json_path.display());
            let text = fs::read_to_string(&json_path)?;
            serde_json::from_str(&text).map_err(|e| SyncError::Config(e.to_string()))
        } else {
            warn!(
                "Neither {} nor {} exists. All configurable values will use their default values instead.",
                CONFIG_TOML, CONFIG_JSON
            );
            Ok(Self::default())
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }
}
