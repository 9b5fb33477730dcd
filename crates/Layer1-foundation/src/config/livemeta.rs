//! Livemeta Config - unified settings
//!
//! Every field has a default, so a partial (or missing) `livemeta.json` is
//! always valid.

use super::store::ConfigStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::debug;

/// Config file name
pub const LIVEMETA_CONFIG_FILE: &str = "livemeta.json";

// ============================================================================
// LivemetaConfig
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivemetaConfig {
    /// Where source units live and which ones count
    #[serde(default)]
    pub source: SourceConfig,

    /// Registry tree behaviour
    #[serde(default)]
    pub registry: RegistrySettings,
}

/// Source unit discovery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    /// Root directories to scan
    #[serde(default = "default_roots")]
    pub roots: Vec<PathBuf>,

    /// File extensions (without the dot) that are source units
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Path substrings to skip
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Honour .gitignore files while walking
    #[serde(default = "default_true")]
    pub respect_gitignore: bool,
}

/// Registry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySettings {
    /// Capacity of the watch notification queue
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Log every dispatched event at debug level
    #[serde(default)]
    pub log_events: bool,
}

fn default_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("src")]
}
fn default_extensions() -> Vec<String> {
    vec!["rs".to_string()]
}
fn default_true() -> bool {
    true
}
fn default_channel_capacity() -> usize {
    256
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            extensions: default_extensions(),
            ignore: Vec::new(),
            respect_gitignore: default_true(),
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            log_events: false,
        }
    }
}

impl SourceConfig {
    /// Whether a path passes the extension and ignore filters
    pub fn accepts(&self, path: &std::path::Path) -> bool {
        let ext_ok = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x == e))
            .unwrap_or(false);

        if !ext_ok {
            return false;
        }

        let text = path.to_string_lossy();
        !self.ignore.iter().any(|pattern| text.contains(pattern.as_str()))
    }
}

impl LivemetaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// User settings overlaid by the current project's settings
    pub fn load() -> Result<Self> {
        let mut stores = Vec::with_capacity(2);
        if let Ok(global) = ConfigStore::global() {
            stores.push(global);
        }
        stores.push(ConfigStore::current_project()?);
        Self::load_layered(&stores)
    }

    /// Read `livemeta.json` from each store in order; later files override
    /// the keys they set. Missing files are skipped.
    pub fn load_layered(stores: &[ConfigStore]) -> Result<Self> {
        let mut merged = Value::Object(Map::new());
        for store in stores {
            if let Some(layer) = store.read(LIVEMETA_CONFIG_FILE)? {
                debug!(dir = %store.dir().display(), "Applying config layer");
                overlay(&mut merged, layer);
            }
        }
        Ok(serde_json::from_value(merged)?)
    }

    pub fn save_to(&self, store: &ConfigStore) -> Result<()> {
        store.write(LIVEMETA_CONFIG_FILE, self)
    }
}

/// Objects merge per key, anything else replaces
fn overlay(base: &mut Value, top: Value) {
    match (base, top) {
        (Value::Object(base), Value::Object(top)) => {
            for (key, value) in top {
                match base.get_mut(&key) {
                    Some(slot) => overlay(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, top) => *slot = top,
    }
}
