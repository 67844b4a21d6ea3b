//! Single-slot pre-migration snapshot
//!
//! Written immediately before a migration attempt, read back only if the
//! attempt fails. Each attempt overwrites the previous snapshot.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::platform::{StorageGateway, now_ms};

const TARGET: &str = "save_vault::backup";

/// Snapshot of the raw tree as it was before migrating
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    /// Tree exactly as loaded
    pub data: Value,
    /// Schema version of `data` (`None` if it could not be read)
    pub version: Option<u32>,
    /// Unix timestamp (ms) when taken
    pub timestamp: f64,
}

impl Backup {
    /// Snapshot `data` now
    pub fn new(data: Value, version: Option<u32>) -> Self {
        Self {
            data,
            version,
            timestamp: now_ms(),
        }
    }

    /// Persist under `key`, returning whether the write succeeded
    pub fn save(&self, storage: &dyn StorageGateway, key: &str) -> bool {
        match serde_json::to_string(self) {
            Ok(json) => {
                let saved = storage.write(key, &json);
                if saved {
                    log::info!(target: TARGET, "Backup saved (version {:?})", self.version);
                }
                saved
            }
            Err(e) => {
                log::error!(target: TARGET, "Failed to serialize backup: {}", e);
                false
            }
        }
    }

    /// Read the snapshot under `key` (`None` if missing or corrupt)
    pub fn load(storage: &dyn StorageGateway, key: &str) -> Option<Self> {
        let json = storage.read(key)?;
        match serde_json::from_str(&json) {
            Ok(backup) => Some(backup),
            Err(e) => {
                log::warn!(target: TARGET, "Ignoring corrupt backup: {}", e);
                None
            }
        }
    }

    pub fn clear(storage: &dyn StorageGateway, key: &str) {
        storage.remove(key);
    }
}
