//! Dot-separated path addressing over a state tree
//!
//! Paths like `stats.gitSurvivor.highScore` are resolved left-to-right:
//! - Mapping segments look up a key
//! - Numeric segments index into sequences
//! - Any other shape at a segment is reported, never panicked on
//!
//! Reads never create nodes. Writes auto-create missing intermediate mappings.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};
use thiserror::Error;

use super::ops::UpdateOp;

/// Separator between path segments
pub const SEPARATOR: char = '.';

/// Errors from parsing a path or writing through one
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PathError {
    #[error("path is empty")]
    EmptyPath,
    #[error("path `{path}` contains an empty segment")]
    EmptySegment { path: String },
    #[error("`{path}` holds a {found}, not a mapping")]
    NotAMapping { path: String, found: ValueKind },
    #[error("index at `{path}` is out of range for a sequence of length {len}")]
    IndexOutOfRange { path: String, len: usize },
    #[error("cannot {operation} `{path}`: value is a {found}, not a number")]
    InvalidOperation {
        path: String,
        operation: UpdateOp,
        found: ValueKind,
    },
    #[error("cannot {operation} `{path}`: result is not a finite number")]
    NumberOverflow { path: String, operation: UpdateOp },
}

/// Shape of a node in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Sequence,
    Mapping,
}

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Sequence,
            Value::Object(_) => ValueKind::Mapping,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Sequence => "sequence",
            ValueKind::Mapping => "mapping",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed dot-separated path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathAddress {
    raw: String,
    segments: Vec<String>,
}

impl PathAddress {
    /// Parse a dot-separated path, rejecting empty paths and empty segments
    pub fn parse(path: &str) -> Result<Self, PathError> {
        if path.is_empty() {
            return Err(PathError::EmptyPath);
        }
        let segments: Vec<String> = path.split(SEPARATOR).map(str::to_owned).collect();
        if segments.iter().any(String::is_empty) {
            return Err(PathError::EmptySegment {
                path: path.to_owned(),
            });
        }
        Ok(Self {
            raw: path.to_owned(),
            segments,
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The first `depth` segments joined back into a path (`(root)` for zero)
    pub fn prefix(&self, depth: usize) -> String {
        if depth == 0 {
            return "(root)".to_owned();
        }
        self.segments[..depth.min(self.segments.len())].join(".")
    }
}

impl FromStr for PathAddress {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PathAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Outcome of walking a path without modifying the tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    /// Every segment resolved
    Found(&'a Value),
    /// The segment at `depth` does not exist
    Missing { depth: usize },
    /// The node reached before segment `depth` cannot be descended into
    WrongShape { depth: usize, found: ValueKind },
}

impl<'a> Lookup<'a> {
    /// The resolved value, treating `null` as absent
    pub fn present(self) -> Option<&'a Value> {
        match self {
            Lookup::Found(Value::Null) => None,
            Lookup::Found(value) => Some(value),
            _ => None,
        }
    }
}

/// Walk `address` through `tree`
pub fn lookup<'a>(tree: &'a Value, address: &PathAddress) -> Lookup<'a> {
    let mut node = tree;
    for (depth, segment) in address.segments().iter().enumerate() {
        let child = match node {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => match segment.parse::<usize>() {
                Ok(index) => items.get(index),
                Err(_) => {
                    return Lookup::WrongShape {
                        depth,
                        found: ValueKind::Sequence,
                    };
                }
            },
            other => {
                return Lookup::WrongShape {
                    depth,
                    found: ValueKind::of(other),
                };
            }
        };
        match child {
            Some(child) => node = child,
            None => return Lookup::Missing { depth },
        }
    }
    Lookup::Found(node)
}

/// Read the value at `path`, or `default` if anything along the way is absent,
/// `null`, or the wrong shape. Malformed paths also yield `default`.
pub fn get(tree: &Value, path: &str, default: Value) -> Value {
    match PathAddress::parse(path) {
        Ok(address) => lookup(tree, &address).present().cloned().unwrap_or(default),
        Err(_) => default,
    }
}

/// Write `value` at `path`, creating intermediate mappings as needed.
/// Returns the tree for chaining.
pub fn set<'a>(tree: &'a mut Value, path: &str, value: Value) -> Result<&'a mut Value, PathError> {
    let address = PathAddress::parse(path)?;
    set_at(tree, &address, value)?;
    Ok(tree)
}

/// Write `value` at a parsed address, returning the previous value (if any)
pub fn set_at(
    tree: &mut Value,
    address: &PathAddress,
    value: Value,
) -> Result<Option<Value>, PathError> {
    let (last, parents) = address
        .segments()
        .split_last()
        .ok_or(PathError::EmptyPath)?;

    let mut node = tree;
    for (depth, segment) in parents.iter().enumerate() {
        node = descend_or_create(node, segment, depth, address)?;
    }

    let depth = parents.len();
    if node.is_null() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => Ok(map.insert(last.clone(), value)),
        Value::Array(items) => {
            let len = items.len();
            match segment_index(last, len) {
                Some(index) => Ok(Some(std::mem::replace(&mut items[index], value))),
                None => Err(PathError::IndexOutOfRange {
                    path: address.prefix(depth + 1),
                    len,
                }),
            }
        }
        other => Err(PathError::NotAMapping {
            path: address.prefix(depth),
            found: ValueKind::of(other),
        }),
    }
}

/// Step one segment down for a write, auto-creating a mapping where the
/// segment is absent or `null`
fn descend_or_create<'a>(
    node: &'a mut Value,
    segment: &str,
    depth: usize,
    address: &PathAddress,
) -> Result<&'a mut Value, PathError> {
    if node.is_null() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => Ok(map.entry(segment.to_owned()).or_insert(Value::Null)),
        Value::Array(items) => {
            let len = items.len();
            match segment_index(segment, len) {
                Some(index) => Ok(&mut items[index]),
                None => Err(PathError::IndexOutOfRange {
                    path: address.prefix(depth + 1),
                    len,
                }),
            }
        }
        other => Err(PathError::NotAMapping {
            path: address.prefix(depth),
            found: ValueKind::of(other),
        }),
    }
}

fn segment_index(segment: &str, len: usize) -> Option<usize> {
    segment.parse::<usize>().ok().filter(|index| *index < len)
}
