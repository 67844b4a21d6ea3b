//! Backup-wrapped migration driver
//!
//! Each attempt moves through:
//! `Idle → BackedUp → Migrating → Validating → {Done | Restoring} → Idle`
//!
//! Steps may drop or rename fields, so there is no mid-chain rollback: the
//! whole attempt is the unit of recovery, backed by one pre-chain snapshot.

use std::cell::Cell;
use std::fmt;

use serde_json::Value;

use super::backup::Backup;
use super::error::MigrationError;
use super::registry::{MigrationHop, MigrationRegistry, read_version, stamp_version};
use super::validation::validate;
use crate::consts::DEFAULT_BACKUP_KEY;
use crate::platform::StorageGateway;
use crate::store::ValueKind;

const TARGET: &str = "save_vault::migration";

/// Where the engine is within an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    Idle,
    BackedUp,
    Migrating,
    Validating,
    Done,
    Restoring,
}

/// How the returned tree was produced
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationOutcome {
    /// Nothing stored: factory defaults
    Fresh,
    /// Stored blob could not be understood: factory defaults
    Corrupt { reason: String },
    /// Already at the current version
    Current,
    /// Chain applied and validated
    Migrated { from: u32, to: u32, steps: usize },
    /// Attempt failed; the pre-migration backup was returned (`version` is
    /// `None` when the stored version itself was unreadable)
    Restored {
        version: Option<u32>,
        error: MigrationError,
    },
    /// Attempt failed and no backup was available: factory defaults
    Defaulted { error: MigrationError },
}

impl MigrationOutcome {
    /// Whether the tree carries forward the stored data (migrated or as-is)
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            MigrationOutcome::Fresh | MigrationOutcome::Current | MigrationOutcome::Migrated { .. }
        )
    }
}

/// Result tree plus how it was obtained
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationReport {
    pub tree: Value,
    pub outcome: MigrationOutcome,
}

/// Stored blob, classified before any work is done
enum Parsed {
    Absent,
    Corrupt(String),
    /// A mapping whose `version` field is unusable
    Malformed { tree: Value, reason: String },
    Tree { tree: Value, version: u32 },
}

fn parse_blob(raw: Option<&str>) -> Parsed {
    match raw {
        None => Parsed::Absent,
        Some(s) if s.trim().is_empty() => Parsed::Absent,
        Some(s) => match serde_json::from_str::<Value>(s) {
            Ok(tree) => classify(tree),
            Err(e) => Parsed::Corrupt(format!("invalid JSON: {e}")),
        },
    }
}

fn classify(tree: Value) -> Parsed {
    let version = match &tree {
        Value::Null => return Parsed::Absent,
        // A missing version means the oldest supported schema
        Value::Object(map) => match map.get("version") {
            None | Some(Value::Null) => Some(1),
            Some(_) => read_version(&tree),
        },
        other => {
            return Parsed::Corrupt(format!("root is a {}, not a mapping", ValueKind::of(other)));
        }
    };
    match version {
        Some(version) => Parsed::Tree { tree, version },
        None => Parsed::Malformed {
            tree,
            reason: "version is not a non-negative integer".to_owned(),
        },
    }
}

/// Drives the migration chain for one schema
pub struct MigrationEngine {
    registry: MigrationRegistry,
    current_version: u32,
    required_fields: Vec<String>,
    defaults: Box<dyn Fn() -> Value>,
    backup_key: String,
    phase: Cell<MigrationPhase>,
}

impl fmt::Debug for MigrationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationEngine")
            .field("current_version", &self.current_version)
            .field("required_fields", &self.required_fields)
            .field("backup_key", &self.backup_key)
            .field("steps", &self.registry.len())
            .field("phase", &self.phase.get())
            .finish()
    }
}

impl MigrationEngine {
    /// Create an engine targeting `current_version`.
    ///
    /// `defaults` builds the factory-default tree; its `version` is always
    /// forced to `current_version`.
    pub fn new(
        registry: MigrationRegistry,
        current_version: u32,
        defaults: impl Fn() -> Value + 'static,
    ) -> Self {
        Self {
            registry,
            current_version,
            required_fields: Vec::new(),
            defaults: Box::new(defaults),
            backup_key: DEFAULT_BACKUP_KEY.to_owned(),
            phase: Cell::new(MigrationPhase::Idle),
        }
    }

    /// Top-level fields that must be present after migrating
    pub fn with_required_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_backup_key(mut self, key: impl Into<String>) -> Self {
        self.backup_key = key.into();
        self
    }

    pub fn current_version(&self) -> u32 {
        self.current_version
    }

    pub fn backup_key(&self) -> &str {
        &self.backup_key
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    pub fn required_fields(&self) -> &[String] {
        &self.required_fields
    }

    pub fn phase(&self) -> MigrationPhase {
        self.phase.get()
    }

    /// Fresh factory-default tree at the current version
    pub fn default_data(&self) -> Value {
        let mut tree = (self.defaults)();
        stamp_version(&mut tree, self.current_version);
        tree
    }

    /// Whether the stored blob is at an older schema version
    pub fn needs_migration(&self, raw: Option<&str>) -> bool {
        match parse_blob(raw) {
            Parsed::Tree { version, .. } => version < self.current_version,
            _ => false,
        }
    }

    /// Preview the hops a stored blob would go through. Nothing is written.
    pub fn migration_path(&self, raw: Option<&str>) -> Result<Vec<MigrationHop>, MigrationError> {
        match parse_blob(raw) {
            Parsed::Tree { version, .. } => self.registry.hops(version, self.current_version),
            Parsed::Malformed { reason, .. } => Err(MigrationError::InvalidVersion { reason }),
            Parsed::Absent | Parsed::Corrupt(_) => Ok(Vec::new()),
        }
    }

    /// Bring a stored blob up to the current version.
    ///
    /// Never fails except with `MigrationError::Downgrade` for data newer than
    /// this build understands. Every other failure yields the pre-migration
    /// backup or, failing that, factory defaults.
    pub fn safe_migrate(
        &self,
        storage: &dyn StorageGateway,
        raw: Option<&str>,
    ) -> Result<Value, MigrationError> {
        self.migrate_with_report(storage, raw).map(|report| report.tree)
    }

    /// `safe_migrate` for an already-parsed tree (`null` counts as absent)
    pub fn safe_migrate_value(
        &self,
        storage: &dyn StorageGateway,
        raw: Value,
    ) -> Result<Value, MigrationError> {
        self.run(storage, classify(raw)).map(|report| report.tree)
    }

    /// `safe_migrate`, also reporting how the tree was produced
    pub fn migrate_with_report(
        &self,
        storage: &dyn StorageGateway,
        raw: Option<&str>,
    ) -> Result<MigrationReport, MigrationError> {
        self.run(storage, parse_blob(raw))
    }

    fn run(
        &self,
        storage: &dyn StorageGateway,
        parsed: Parsed,
    ) -> Result<MigrationReport, MigrationError> {
        let (tree, from) = match parsed {
            Parsed::Absent => {
                log::info!(target: TARGET, "No stored data, using defaults");
                return Ok(MigrationReport {
                    tree: self.default_data(),
                    outcome: MigrationOutcome::Fresh,
                });
            }
            Parsed::Corrupt(reason) => {
                log::error!(target: TARGET, "Stored data is unreadable ({}), using defaults", reason);
                return Ok(MigrationReport {
                    tree: self.default_data(),
                    outcome: MigrationOutcome::Corrupt { reason },
                });
            }
            Parsed::Malformed { tree, reason } => {
                // The tree is real user data: snapshot it before giving up on it
                log::error!(target: TARGET, "Stored data has an unusable version ({})", reason);
                self.back_up(storage, &tree, None);
                return Ok(self.restore(storage, MigrationError::InvalidVersion { reason }));
            }
            Parsed::Tree { tree, version } => (tree, version),
        };

        let to = self.current_version;
        if from == to {
            return Ok(MigrationReport {
                tree,
                outcome: MigrationOutcome::Current,
            });
        }
        if from > to {
            log::error!(target: TARGET, "Stored data is version {}, newer than supported {}", from, to);
            return Err(MigrationError::Downgrade { from, to });
        }

        log::info!(target: TARGET, "Migrating stored data from version {} to {}", from, to);
        self.back_up(storage, &tree, Some(from));

        let result = self.apply_chain(tree, from).and_then(|(tree, steps)| {
            self.enter(MigrationPhase::Validating);
            validate(&tree, to, &self.required_fields)?;
            Ok((tree, steps))
        });

        match result {
            Ok((tree, steps)) => {
                self.enter(MigrationPhase::Done);
                log::info!(target: TARGET, "Migration complete ({} steps, now version {})", steps, to);
                self.enter(MigrationPhase::Idle);
                Ok(MigrationReport {
                    tree,
                    outcome: MigrationOutcome::Migrated { from, to, steps },
                })
            }
            Err(error) => {
                log::error!(target: TARGET, "Migration from version {} failed: {}", from, error);
                Ok(self.restore(storage, error))
            }
        }
    }

    fn back_up(&self, storage: &dyn StorageGateway, tree: &Value, version: Option<u32>) {
        if Backup::new(tree.clone(), version).save(storage, &self.backup_key) {
            self.enter(MigrationPhase::BackedUp);
        } else {
            // A stale slot from an earlier attempt must not be restored for this one
            log::warn!(target: TARGET, "Backup write failed, continuing without a snapshot");
            Backup::clear(storage, &self.backup_key);
        }
    }

    /// Apply every step from `from` up to the current version
    fn apply_chain(&self, tree: Value, from: u32) -> Result<(Value, usize), MigrationError> {
        let chain = self.registry.resolve(from, self.current_version)?;
        self.enter(MigrationPhase::Migrating);

        let mut tree = tree;
        for step in &chain {
            tree = step
                .apply(tree)
                .map_err(|e| MigrationError::StepExecution {
                    from: step.from_version(),
                    reason: e.to_string(),
                })?;

            let produced = read_version(&tree);
            if produced != Some(step.to_version()) {
                return Err(MigrationError::StepExecution {
                    from: step.from_version(),
                    reason: match produced {
                        Some(v) => format!("step produced version {}, expected {}", v, step.to_version()),
                        None => format!("step produced no version, expected {}", step.to_version()),
                    },
                });
            }
            log::debug!(target: TARGET, "Applied {} -> {}: {}", step.from_version(), step.to_version(), step.description());
        }
        Ok((tree, chain.len()))
    }

    fn restore(&self, storage: &dyn StorageGateway, error: MigrationError) -> MigrationReport {
        self.enter(MigrationPhase::Restoring);
        let report = match Backup::load(storage, &self.backup_key) {
            Some(backup) => {
                log::error!(target: TARGET, "Restored version {:?} backup taken at {}", backup.version, backup.timestamp);
                MigrationReport {
                    tree: backup.data,
                    outcome: MigrationOutcome::Restored {
                        version: backup.version,
                        error,
                    },
                }
            }
            None => {
                log::error!(target: TARGET, "No backup available, falling back to defaults");
                MigrationReport {
                    tree: self.default_data(),
                    outcome: MigrationOutcome::Defaulted { error },
                }
            }
        };
        self.enter(MigrationPhase::Idle);
        report
    }

    fn enter(&self, phase: MigrationPhase) {
        log::debug!(target: TARGET, "{:?} -> {:?}", self.phase.get(), phase);
        self.phase.set(phase);
    }
}
