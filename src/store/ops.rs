//! Observed mutation primitives
//!
//! `PathStore` wraps the raw path reads/writes with numeric update operations
//! and reports every successful mutation to an optional observer.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use super::path::{self, PathAddress, PathError, ValueKind};

/// How `update` combines the incoming value with the stored one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateOp {
    /// Overwrite
    Set,
    /// Add to the stored number (absent counts as 0)
    Increment,
    /// Keep the larger of stored and incoming (absent counts as 0)
    Max,
}

impl UpdateOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateOp::Set => "set",
            UpdateOp::Increment => "increment",
            UpdateOp::Max => "max",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "set" => Some(UpdateOp::Set),
            "increment" | "incr" | "inc" => Some(UpdateOp::Increment),
            "max" => Some(UpdateOp::Max),
            _ => None,
        }
    }
}

impl fmt::Display for UpdateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single applied mutation, as seen by the observer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    pub path: String,
    /// Previous value (`None` when absent or `null`)
    pub old_value: Option<Value>,
    pub new_value: Value,
    pub operation: UpdateOp,
}

/// Change-notification callback
pub type Observer = Box<dyn FnMut(&Change)>;

/// Path-addressed get/set/update over a state tree
#[derive(Default)]
pub struct PathStore {
    observer: Option<Observer>,
}

impl fmt::Debug for PathStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathStore")
            .field("observed", &self.observer.is_some())
            .finish()
    }
}

impl PathStore {
    pub fn new() -> Self {
        Self { observer: None }
    }

    /// Create a store that reports every mutation to `observer`
    pub fn with_observer(observer: impl FnMut(&Change) + 'static) -> Self {
        Self {
            observer: Some(Box::new(observer)),
        }
    }

    pub fn set_observer(&mut self, observer: impl FnMut(&Change) + 'static) {
        self.observer = Some(Box::new(observer));
    }

    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    pub fn get(&self, tree: &Value, path: &str, default: Value) -> Value {
        path::get(tree, path, default)
    }

    pub fn set(&mut self, tree: &mut Value, path: &str, value: Value) -> Result<(), PathError> {
        self.update(tree, path, value, UpdateOp::Set).map(|_| ())
    }

    /// Apply `op` at `path` and return the value now stored there.
    ///
    /// On error the tree is left unchanged and nothing is reported.
    pub fn update(
        &mut self,
        tree: &mut Value,
        path: &str,
        value: Value,
        op: UpdateOp,
    ) -> Result<Value, PathError> {
        let address = PathAddress::parse(path)?;
        let old_value = path::lookup(tree, &address).present().cloned();

        let new_value = match op {
            UpdateOp::Set => value,
            UpdateOp::Increment => {
                let current = stored_number(old_value.as_ref(), &address, op)?;
                let delta = operand_number(&value, &address, op)?;
                add_numbers(&current, &delta).ok_or_else(|| PathError::NumberOverflow {
                    path: address.as_str().to_owned(),
                    operation: op,
                })?
            }
            UpdateOp::Max => {
                let current = stored_number(old_value.as_ref(), &address, op)?;
                let candidate = operand_number(&value, &address, op)?;
                max_number(current, candidate)
            }
        };

        path::set_at(tree, &address, new_value.clone())?;

        if let Some(observer) = self.observer.as_mut() {
            observer(&Change {
                path: address.as_str().to_owned(),
                old_value,
                new_value: new_value.clone(),
                operation: op,
            });
        }
        Ok(new_value)
    }
}

fn stored_number(
    current: Option<&Value>,
    address: &PathAddress,
    op: UpdateOp,
) -> Result<Number, PathError> {
    match current {
        None => Ok(Number::from(0)),
        Some(value) => operand_number(value, address, op),
    }
}

fn operand_number(value: &Value, address: &PathAddress, op: UpdateOp) -> Result<Number, PathError> {
    match value {
        Value::Number(n) => Ok(n.clone()),
        other => Err(PathError::InvalidOperation {
            path: address.as_str().to_owned(),
            operation: op,
            found: ValueKind::of(other),
        }),
    }
}

/// Integer sum when both sides fit in `i64` without overflow, float otherwise.
/// `None` if the float sum is not finite.
fn add_numbers(a: &Number, b: &Number) -> Option<Value> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = x.checked_add(y) {
            return Some(Value::from(sum));
        }
    }
    Number::from_f64(as_f64(a) + as_f64(b)).map(Value::Number)
}

/// The larger operand, keeping its original representation
fn max_number(current: Number, candidate: Number) -> Value {
    let candidate_wins = match (current.as_i64(), candidate.as_i64()) {
        (Some(x), Some(y)) => y > x,
        _ => as_f64(&candidate) > as_f64(&current),
    };
    Value::Number(if candidate_wins { candidate } else { current })
}

fn as_f64(n: &Number) -> f64 {
    n.as_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_increment_from_absent() {
        let mut store = PathStore::new();
        let mut tree = json!({});
        store
            .update(&mut tree, "stats.plays", json!(1), UpdateOp::Increment)
            .unwrap();
        store
            .update(&mut tree, "stats.plays", json!(2), UpdateOp::Increment)
            .unwrap();
        assert_eq!(tree, json!({"stats": {"plays": 3}}));
    }

    #[test]
    fn test_negative_increment_is_legal() {
        let mut store = PathStore::new();
        let mut tree = json!({"lives": 3});
        let value = store
            .update(&mut tree, "lives", json!(-5), UpdateOp::Increment)
            .unwrap();
        assert_eq!(value, json!(-2));
    }

    #[test]
    fn test_increment_mixed_float() {
        let mut store = PathStore::new();
        let mut tree = json!({"time": 1});
        let value = store
            .update(&mut tree, "time", json!(0.5), UpdateOp::Increment)
            .unwrap();
        assert_eq!(value, json!(1.5));
    }

    #[test]
    fn test_increment_overflow_falls_back_to_float() {
        let mut store = PathStore::new();
        let mut tree = json!({"n": i64::MAX});
        let value = store
            .update(&mut tree, "n", json!(1), UpdateOp::Increment)
            .unwrap();
        assert!(value.is_f64());
    }

    #[test]
    fn test_increment_float_overflow_fails() {
        let seen = Rc::new(RefCell::new(0));
        let sink = seen.clone();
        let mut store = PathStore::with_observer(move |_| *sink.borrow_mut() += 1);
        let mut tree = json!({"n": f64::MAX});
        let err = store
            .update(&mut tree, "n", json!(f64::MAX), UpdateOp::Increment)
            .unwrap_err();
        assert_eq!(
            err,
            PathError::NumberOverflow {
                path: "n".into(),
                operation: UpdateOp::Increment,
            }
        );
        assert_eq!(tree, json!({"n": f64::MAX}));
        assert_eq!(*seen.borrow(), 0);
    }

    #[test]
    fn test_increment_non_numeric_operand_fails() {
        let mut store = PathStore::new();
        let mut tree = json!({"plays": 3});
        let err = store
            .update(&mut tree, "plays", json!("1"), UpdateOp::Increment)
            .unwrap_err();
        assert_eq!(
            err,
            PathError::InvalidOperation {
                path: "plays".into(),
                operation: UpdateOp::Increment,
                found: ValueKind::String,
            }
        );
        assert_eq!(tree, json!({"plays": 3}));
    }

    #[test]
    fn test_observer_reports_previous_value() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut store = PathStore::with_observer(move |change| sink.borrow_mut().push(change.clone()));

        let mut tree = json!({"stats": {"plays": 4, "best": 10}, "name": "ada"});
        store
            .update(&mut tree, "stats.plays", json!(1), UpdateOp::Increment)
            .unwrap();
        store
            .update(&mut tree, "stats.best", json!(3), UpdateOp::Max)
            .unwrap();
        store.set(&mut tree, "name", json!("grace")).unwrap();

        let seen = seen.borrow();
        let old: Vec<_> = seen.iter().map(|c| c.old_value.clone()).collect();
        let new: Vec<_> = seen.iter().map(|c| c.new_value.clone()).collect();
        assert_eq!(old, vec![Some(json!(4)), Some(json!(10)), Some(json!("ada"))]);
        assert_eq!(new, vec![json!(5), json!(10), json!("grace")]);
    }

    #[test]
    fn test_increment_non_numeric_fails() {
        let mut store = PathStore::new();
        let mut tree = json!({"name": "ada"});
        let err = store
            .update(&mut tree, "name", json!(1), UpdateOp::Increment)
            .unwrap_err();
        assert_eq!(
            err,
            PathError::InvalidOperation {
                path: "name".into(),
                operation: UpdateOp::Increment,
                found: ValueKind::String,
            }
        );
        assert_eq!(tree, json!({"name": "ada"}));
    }

    #[test]
    fn test_max_never_decreases() {
        let mut store = PathStore::new();
        let mut tree = json!({"best": 500});
        store
            .update(&mut tree, "best", json!(300), UpdateOp::Max)
            .unwrap();
        assert_eq!(tree["best"], json!(500));
        store
            .update(&mut tree, "best", json!(800), UpdateOp::Max)
            .unwrap();
        assert_eq!(tree["best"], json!(800));
    }

    #[test]
    fn test_max_absent_counts_as_zero() {
        let mut store = PathStore::new();
        let mut tree = json!({});
        let value = store
            .update(&mut tree, "best", json!(-4), UpdateOp::Max)
            .unwrap();
        assert_eq!(value, json!(0));
    }

    #[test]
    fn test_observer_sees_every_mutation() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut store = PathStore::with_observer(move |change| sink.borrow_mut().push(change.clone()));

        let mut tree = json!({});
        store.set(&mut tree, "a.b", json!("x")).unwrap();
        store
            .update(&mut tree, "a.count", json!(2), UpdateOp::Increment)
            .unwrap();
        // Failed updates are not reported
        assert!(
            store
                .update(&mut tree, "a.b", json!(1), UpdateOp::Max)
                .is_err()
        );

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[0],
            Change {
                path: "a.b".into(),
                old_value: None,
                new_value: json!("x"),
                operation: UpdateOp::Set,
            }
        );
        assert_eq!(seen[1].old_value, None);
        assert_eq!(seen[1].new_value, json!(2));
        assert_eq!(seen[1].operation, UpdateOp::Increment);
    }

    #[test]
    fn test_update_op_from_str() {
        assert_eq!(UpdateOp::from_str("INCR"), Some(UpdateOp::Increment));
        assert_eq!(UpdateOp::from_str("max"), Some(UpdateOp::Max));
        assert_eq!(UpdateOp::from_str("min"), None);
    }

    proptest! {
        #[test]
        fn test_max_is_monotonic(initial in proptest::option::of(-1000i64..1000), values in proptest::collection::vec(-1000i64..1000, 1..20)) {
            let mut store = PathStore::new();
            let mut tree = json!({});
            if let Some(initial) = initial {
                store.set(&mut tree, "score.best", json!(initial)).unwrap();
            }
            for v in &values {
                store.update(&mut tree, "score.best", json!(v), UpdateOp::Max).unwrap();
            }
            let expected = values.iter().copied().chain(std::iter::once(initial.unwrap_or(0))).max().unwrap();
            prop_assert_eq!(tree["score"]["best"].as_i64(), Some(expected));
        }
    }
}
