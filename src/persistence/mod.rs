//! Versioned persistence with a crash-safe upgrade path
//!
//! Features:
//! - Ordered, gap-free migration registry
//! - Single-slot backup taken before each migration attempt
//! - Restore-on-failure (backup, else factory defaults)
//! - Post-migration structural validation

pub mod backup;
pub mod engine;
pub mod error;
pub mod registry;
pub mod validation;

pub use backup::Backup;
pub use engine::{MigrationEngine, MigrationOutcome, MigrationPhase, MigrationReport};
pub use error::{MigrationError, StepError};
pub use registry::{
    MigrationHop, MigrationRegistry, MigrationStep, read_version, shallow_merge, stamp_version,
};
pub use validation::validate;
