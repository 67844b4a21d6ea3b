//! Ordered table of per-version migration steps

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use super::error::{MigrationError, StepError};

/// Transform from schema version `v` to `v + 1`
pub type StepFn = dyn Fn(Value) -> Result<Value, StepError>;

/// A single registered migration
pub struct MigrationStep {
    from_version: u32,
    description: String,
    transform: Box<StepFn>,
}

impl fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStep")
            .field("from_version", &self.from_version)
            .field("description", &self.description)
            .finish()
    }
}

impl MigrationStep {
    pub fn from_version(&self) -> u32 {
        self.from_version
    }

    pub fn to_version(&self) -> u32 {
        self.from_version + 1
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Run the transform
    pub fn apply(&self, tree: Value) -> Result<Value, StepError> {
        (self.transform)(tree)
    }
}

/// Read-only description of one hop in a resolved chain
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MigrationHop {
    pub from: u32,
    pub to: u32,
    pub description: String,
}

/// Migration steps keyed by source version
#[derive(Debug, Default)]
pub struct MigrationRegistry {
    steps: BTreeMap<u32, MigrationStep>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the step that upgrades `from_version` to `from_version + 1`.
    /// There is no version after `u32::MAX`, so no step may start there.
    pub fn register<F>(
        &mut self,
        from_version: u32,
        description: impl Into<String>,
        transform: F,
    ) -> Result<(), MigrationError>
    where
        F: Fn(Value) -> Result<Value, StepError> + 'static,
    {
        if from_version == u32::MAX {
            return Err(MigrationError::VersionOverflow(from_version));
        }
        if self.steps.contains_key(&from_version) {
            return Err(MigrationError::DuplicateVersion(from_version));
        }
        self.steps.insert(
            from_version,
            MigrationStep {
                from_version,
                description: description.into(),
                transform: Box::new(transform),
            },
        );
        Ok(())
    }

    /// Remove a registered step, returning it
    pub fn unregister(&mut self, from_version: u32) -> Option<MigrationStep> {
        self.steps.remove(&from_version)
    }

    pub fn contains(&self, from_version: u32) -> bool {
        self.steps.contains_key(&from_version)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps for `from..to`, in order
    pub fn resolve(&self, from: u32, to: u32) -> Result<Vec<&MigrationStep>, MigrationError> {
        if from > to {
            return Err(MigrationError::Downgrade { from, to });
        }
        (from..to)
            .map(|version| {
                self.steps
                    .get(&version)
                    .ok_or(MigrationError::MissingMigration { version })
            })
            .collect()
    }

    /// Like `resolve`, but only describes the hops
    pub fn hops(&self, from: u32, to: u32) -> Result<Vec<MigrationHop>, MigrationError> {
        Ok(self
            .resolve(from, to)?
            .into_iter()
            .map(|step| MigrationHop {
                from: step.from_version(),
                to: step.to_version(),
                description: step.description().to_owned(),
            })
            .collect())
    }
}

/// Overlay `patch`'s top-level fields onto `base`; everything else in `base`
/// passes through untouched. A non-mapping `base` is replaced by `patch`.
pub fn shallow_merge(base: Value, patch: Value) -> Value {
    match (base, patch) {
        (Value::Object(mut base), Value::Object(patch)) => {
            base.extend(patch);
            Value::Object(base)
        }
        (_, patch) => patch,
    }
}

/// Set the root `version` field (no-op on non-mapping roots)
pub fn stamp_version(tree: &mut Value, version: u32) {
    if let Value::Object(map) = tree {
        map.insert("version".to_owned(), Value::from(version));
    }
}

/// The root `version` field, if it is a valid integer
pub fn read_version(tree: &Value) -> Option<u32> {
    tree.get("version")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bump(tree: Value) -> Result<Value, StepError> {
        let next = read_version(&tree).unwrap_or(1) + 1;
        let mut tree = tree;
        stamp_version(&mut tree, next);
        Ok(tree)
    }

    fn registry_with(versions: &[u32]) -> MigrationRegistry {
        let mut registry = MigrationRegistry::new();
        for v in versions {
            registry.register(*v, format!("v{} to v{}", v, v + 1), bump).unwrap();
        }
        registry
    }

    #[test]
    fn test_register_duplicate_fails() {
        let mut registry = registry_with(&[1]);
        let err = registry.register(1, "again", bump).unwrap_err();
        assert_eq!(err, MigrationError::DuplicateVersion(1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_last_version_fails() {
        let mut registry = MigrationRegistry::new();
        assert_eq!(
            registry.register(u32::MAX, "nowhere to go", bump),
            Err(MigrationError::VersionOverflow(u32::MAX))
        );
        assert!(registry.is_empty());
        assert!(registry.register(u32::MAX - 1, "last hop", bump).is_ok());
    }

    #[test]
    fn test_resolve_orders_steps() {
        // Registration order does not matter
        let registry = registry_with(&[3, 1, 2]);
        let chain = registry.resolve(1, 4).unwrap();
        let versions: Vec<u32> = chain.iter().map(|s| s.from_version()).collect();
        assert_eq!(versions, vec![1, 2, 3]);

        let chain = registry.resolve(2, 4).unwrap();
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_resolve_equal_is_empty() {
        let registry = registry_with(&[]);
        assert!(registry.resolve(3, 3).unwrap().is_empty());
    }

    #[test]
    fn test_resolve_names_first_gap() {
        let registry = registry_with(&[1, 4]);
        assert_eq!(
            registry.resolve(1, 5).unwrap_err(),
            MigrationError::MissingMigration { version: 2 }
        );
    }

    #[test]
    fn test_resolve_downgrade() {
        let registry = registry_with(&[1, 2]);
        assert_eq!(
            registry.resolve(5, 3).unwrap_err(),
            MigrationError::Downgrade { from: 5, to: 3 }
        );
    }

    #[test]
    fn test_hops_preview() {
        let registry = registry_with(&[1, 2]);
        let hops = registry.hops(1, 3).unwrap();
        assert_eq!(
            hops,
            vec![
                MigrationHop {
                    from: 1,
                    to: 2,
                    description: "v1 to v2".into()
                },
                MigrationHop {
                    from: 2,
                    to: 3,
                    description: "v2 to v3".into()
                },
            ]
        );
    }

    #[test]
    fn test_shallow_merge_passes_unknown_fields() {
        let merged = shallow_merge(
            json!({"version": 1, "custom": {"keep": true}, "stats": 1}),
            json!({"version": 2, "stats": 2}),
        );
        assert_eq!(
            merged,
            json!({"version": 2, "custom": {"keep": true}, "stats": 2})
        );
    }

    #[test]
    fn test_read_version() {
        assert_eq!(read_version(&json!({"version": 3})), Some(3));
        assert_eq!(read_version(&json!({"version": "3"})), None);
        assert_eq!(read_version(&json!({})), None);
    }
}
