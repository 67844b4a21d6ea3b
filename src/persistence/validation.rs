//! Post-migration structural checks
//!
//! Only field presence and exact version equality are checked.

use serde_json::Value;

use super::error::MigrationError;
use super::registry::read_version;

/// Check that `tree` is a mapping at `expected_version` with every required
/// top-level field present and non-null
pub fn validate(
    tree: &Value,
    expected_version: u32,
    required_fields: &[String],
) -> Result<(), MigrationError> {
    let Value::Object(map) = tree else {
        return Err(MigrationError::Validation {
            reason: "root is not a mapping".to_owned(),
        });
    };

    match read_version(tree) {
        Some(v) if v == expected_version => {}
        Some(v) => {
            return Err(MigrationError::Validation {
                reason: format!("version is {v}, expected {expected_version}"),
            });
        }
        None => {
            return Err(MigrationError::Validation {
                reason: "version is missing or not an integer".to_owned(),
            });
        }
    }

    let missing: Vec<&str> = required_fields
        .iter()
        .filter(|field| map.get(field.as_str()).is_none_or(Value::is_null))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(MigrationError::Validation {
            reason: format!("missing required fields: {}", missing.join(", ")),
        });
    }
    Ok(())
}
