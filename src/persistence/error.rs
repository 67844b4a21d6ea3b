//! Migration error types

use thiserror::Error;

use crate::store::PathError;

/// Errors raised while registering or running migrations.
///
/// `DuplicateVersion`, `VersionOverflow` and `KeyConflict` are configuration
/// errors and surface at registration or when the store is opened.
/// `Downgrade` is the only variant `safe_migrate` returns to its caller; the
/// rest are recovered from internally (restore backup or defaults).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MigrationError {
    #[error("a migration from version {0} is already registered")]
    DuplicateVersion(u32),
    #[error("no migration can start at version {0}: there is no next version")]
    VersionOverflow(u32),
    #[error("no migration registered from version {version}")]
    MissingMigration { version: u32 },
    #[error("stored data is version {from}, newer than supported version {to}")]
    Downgrade { from: u32, to: u32 },
    #[error("migration from version {from} failed: {reason}")]
    StepExecution { from: u32, reason: String },
    #[error("storage key {key:?} is used for both {first} and {second}")]
    KeyConflict {
        key: String,
        first: &'static str,
        second: &'static str,
    },
    #[error("stored version is unusable: {reason}")]
    InvalidVersion { reason: String },
    #[error("migrated data failed validation: {reason}")]
    Validation { reason: String },
}

/// Failure reported by a single migration step
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct StepError(pub String);

impl StepError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<PathError> for StepError {
    fn from(e: PathError) -> Self {
        Self(e.to_string())
    }
}

impl From<serde_json::Error> for StepError {
    fn from(e: serde_json::Error) -> Self {
        Self(e.to_string())
    }
}
