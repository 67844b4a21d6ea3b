//! Path-addressed state store
//!
//! - `path`: dot-path parsing and raw tree reads/writes
//! - `ops`: observed set/increment/max updates
//! - `StateStore`: an explicit store instance that owns the tree, its
//!   storage, and the migration engine used to load it

pub mod ops;
pub mod path;

pub use ops::{Change, Observer, PathStore, UpdateOp};
pub use path::{Lookup, PathAddress, PathError, ValueKind};

use serde_json::Value;

use crate::achievements::{ACHIEVEMENTS_FIELD, AchievementBook};
use crate::persistence::{MigrationEngine, MigrationError, MigrationOutcome};
use crate::platform::StorageGateway;
use crate::settings::StoreSettings;

const TARGET: &str = "save_vault::store";

/// The application's state tree plus everything needed to persist it.
///
/// Construct one at startup with `open` and pass it by handle; the tree is
/// only reachable through this instance.
pub struct StateStore<G: StorageGateway> {
    storage: G,
    engine: MigrationEngine,
    settings: StoreSettings,
    paths: PathStore,
    tree: Value,
    outcome: MigrationOutcome,
}

impl<G: StorageGateway> std::fmt::Debug for StateStore<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("settings", &self.settings)
            .field("engine", &self.engine)
            .field("outcome", &self.outcome)
            .finish()
    }
}

impl<G: StorageGateway> StateStore<G> {
    /// Load the stored tree and bring it up to the engine's version.
    ///
    /// Fails for data written by a newer schema (`Downgrade`) and for
    /// settings whose data key collides with another slot (`KeyConflict`).
    pub fn open(
        storage: G,
        engine: MigrationEngine,
        settings: StoreSettings,
    ) -> Result<Self, MigrationError> {
        settings.check_keys(engine.backup_key())?;
        let raw = storage.read(&settings.data_key);
        let report = engine.migrate_with_report(&storage, raw.as_deref())?;
        log::info!(target: TARGET, "Opened store ({:?})", report.outcome);

        let store = Self {
            storage,
            engine,
            settings,
            paths: PathStore::new(),
            tree: report.tree,
            outcome: report.outcome,
        };
        if matches!(store.outcome, MigrationOutcome::Migrated { .. }) {
            store.save();
        }
        Ok(store)
    }

    pub fn tree(&self) -> &Value {
        &self.tree
    }

    pub fn into_tree(self) -> Value {
        self.tree
    }

    /// How the tree was obtained by the last `open` or `import_json`
    pub fn outcome(&self) -> &MigrationOutcome {
        &self.outcome
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn storage(&self) -> &G {
        &self.storage
    }

    pub fn engine(&self) -> &MigrationEngine {
        &self.engine
    }

    /// Report every mutation to `observer`
    pub fn set_observer(&mut self, observer: impl FnMut(&Change) + 'static) {
        self.paths.set_observer(observer);
    }

    pub fn get(&self, path: &str, default: Value) -> Value {
        self.paths.get(&self.tree, path, default)
    }

    pub fn set(&mut self, path: &str, value: Value) -> Result<(), PathError> {
        self.update(path, value, UpdateOp::Set).map(|_| ())
    }

    /// Apply `op` at `path`, autosaving if enabled
    pub fn update(&mut self, path: &str, value: Value, op: UpdateOp) -> Result<Value, PathError> {
        let new_value = self.paths.update(&mut self.tree, path, value, op)?;
        self.autosave();
        Ok(new_value)
    }

    /// Unlock every achievement in `book` the tree now satisfies
    pub fn check_achievements(&mut self, book: &AchievementBook) -> Result<Vec<String>, PathError> {
        match book.unlocked_list(&self.tree) {
            Some((list, earned)) => {
                self.paths.set(&mut self.tree, ACHIEVEMENTS_FIELD, list)?;
                log::info!(target: TARGET, "Unlocked achievements: {}", earned.join(", "));
                self.autosave();
                Ok(earned)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Write the tree under the data key
    pub fn save(&self) -> bool {
        match serde_json::to_string(&self.tree) {
            Ok(json) => {
                let saved = self.storage.write(&self.settings.data_key, &json);
                if saved {
                    log::debug!(target: TARGET, "Saved state ({} bytes)", json.len());
                } else {
                    log::warn!(target: TARGET, "Failed to save state");
                }
                saved
            }
            Err(e) => {
                log::error!(target: TARGET, "Failed to serialize state: {}", e);
                false
            }
        }
    }

    /// Replace the tree with factory defaults and save
    pub fn reset(&mut self) -> bool {
        self.tree = self.engine.default_data();
        self.outcome = MigrationOutcome::Fresh;
        log::info!(target: TARGET, "State reset to defaults");
        self.save()
    }

    /// Serialize the tree for export
    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        if self.settings.pretty_export {
            serde_json::to_string_pretty(&self.tree)
        } else {
            serde_json::to_string(&self.tree)
        }
    }

    /// Replace the tree with imported data, migrating it first.
    ///
    /// The tree only changes when the import is already current or migrates
    /// cleanly; otherwise the outcome is returned and nothing is replaced.
    pub fn import_json(&mut self, json: &str) -> Result<MigrationOutcome, MigrationError> {
        let report = self.engine.migrate_with_report(&self.storage, Some(json))?;
        match report.outcome {
            MigrationOutcome::Current | MigrationOutcome::Migrated { .. } => {
                self.tree = report.tree;
                self.outcome = report.outcome.clone();
                log::info!(target: TARGET, "Imported state ({:?})", report.outcome);
                self.save();
            }
            ref outcome => {
                log::warn!(target: TARGET, "Import rejected ({:?}), keeping current state", outcome);
            }
        }
        Ok(report.outcome)
    }

    fn autosave(&self) {
        if self.settings.autosave {
            self.save();
        }
    }
}
