//! Store configuration
//!
//! Persisted separately from the state tree, under its own storage key.

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_BACKUP_KEY, DEFAULT_DATA_KEY};
use crate::persistence::MigrationError;
use crate::platform::StorageGateway;

const TARGET: &str = "save_vault::settings";

/// Storage keys and write policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Key holding the serialized state tree
    pub data_key: String,
    /// Key holding the single-slot pre-migration backup
    pub backup_key: String,
    /// Save after every successful mutation
    pub autosave: bool,
    /// Pretty-print JSON written by `export`
    pub pretty_export: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            data_key: DEFAULT_DATA_KEY.to_owned(),
            backup_key: DEFAULT_BACKUP_KEY.to_owned(),
            autosave: true,
            pretty_export: true,
        }
    }
}

impl StoreSettings {
    /// Storage key for the settings themselves
    pub const STORAGE_KEY: &'static str = "save_vault_settings";

    /// Disable autosave (batch writers call `save` themselves)
    pub fn manual_save(mut self) -> Self {
        self.autosave = false;
        self
    }

    /// Fail if the data, backup and settings slots are not all distinct.
    /// `backup_key` is the slot the migration engine will actually write.
    pub fn check_keys(&self, backup_key: &str) -> Result<(), MigrationError> {
        let slots = [
            ("data", self.data_key.as_str()),
            ("backup", backup_key),
            ("settings", Self::STORAGE_KEY),
        ];
        for (i, (first, key)) in slots.iter().enumerate() {
            if let Some((second, _)) = slots[i + 1..].iter().find(|(_, other)| other == key) {
                return Err(MigrationError::KeyConflict {
                    key: key.to_string(),
                    first: *first,
                    second: *second,
                });
            }
        }
        Ok(())
    }

    /// Load settings from storage, falling back to defaults.
    /// Missing fields take their default values.
    pub fn load(storage: &dyn StorageGateway) -> Self {
        if let Some(json) = storage.read(Self::STORAGE_KEY) {
            match serde_json::from_str(&json) {
                Ok(settings) => {
                    log::info!(target: TARGET, "Loaded store settings");
                    return settings;
                }
                Err(e) => log::warn!(target: TARGET, "Ignoring corrupt store settings: {}", e),
            }
        }

        log::info!(target: TARGET, "Using default store settings");
        Self::default()
    }

    /// Save settings to storage
    pub fn save(&self, storage: &dyn StorageGateway) -> bool {
        match serde_json::to_string(self) {
            Ok(json) => {
                let saved = storage.write(Self::STORAGE_KEY, &json);
                if saved {
                    log::info!(target: TARGET, "Store settings saved");
                }
                saved
            }
            Err(e) => {
                log::error!(target: TARGET, "Failed to serialize store settings: {}", e);
                false
            }
        }
    }
}
