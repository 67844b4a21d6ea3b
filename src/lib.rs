//! Save Vault - versioned local state that survives schema changes
//!
//! Core modules:
//! - `store`: Path-addressed get/set/update over the state tree
//! - `persistence`: Migration registry, engine, backup and validation
//! - `platform`: Browser/native storage and time
//! - `schema`: The bundled schema (defaults and migrations)
//! - `achievements`: Condition rules evaluated against the tree
//! - `settings`: Store configuration

pub mod achievements;
pub mod persistence;
pub mod platform;
pub mod schema;
pub mod settings;
pub mod store;

pub use achievements::{AchievementBook, Condition};
pub use persistence::{MigrationEngine, MigrationError, MigrationOutcome, MigrationRegistry};
pub use platform::{MemoryStorage, StorageGateway};
pub use settings::StoreSettings;
pub use store::{PathStore, StateStore, UpdateOp};

/// A nested mapping of scalars, mappings and sequences with an integer
/// `version` at the root
pub type StateTree = serde_json::Value;

/// Storage configuration constants
pub mod consts {
    /// Default key for the serialized state tree
    pub const DEFAULT_DATA_KEY: &str = "save_vault_data";
    /// Default key for the pre-migration backup slot
    pub const DEFAULT_BACKUP_KEY: &str = "save_vault_backup";
    /// Directory used by the native CLI when none is given
    pub const DEFAULT_NATIVE_DIR: &str = ".save-vault";
}
