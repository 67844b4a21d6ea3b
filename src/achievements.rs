//! Achievement rules over the state tree
//!
//! A rule pairs an id with a condition such as
//! `stats.gitSurvivor.highScore >= 1000`. Conditions are parsed once into a
//! small AST (path, comparator, literal) and evaluated on every check.
//! Unlocked ids are appended to the tree's `achievements` sequence.

use std::cmp::Ordering;
use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::store::path::{self, PathAddress, PathError};

/// Top-level field holding unlocked achievement ids
pub const ACHIEVEMENTS_FIELD: &str = "achievements";

/// Errors from building rules
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("condition `{0}` has no comparator")]
    MissingComparator(String),
    #[error("condition `{0}` has no value to compare against")]
    MissingLiteral(String),
    #[error("invalid path in condition: {0}")]
    Path(#[from] PathError),
    #[error("achievement `{0}` is already registered")]
    DuplicateRule(String),
    #[error("invalid rule definitions: {0}")]
    Definitions(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparator {
    /// Longest tokens first so `>=` is not read as `>`
    const TOKENS: [(&'static str, Comparator); 6] = [
        (">=", Comparator::Ge),
        ("<=", Comparator::Le),
        ("==", Comparator::Eq),
        ("!=", Comparator::Ne),
        (">", Comparator::Gt),
        ("<", Comparator::Lt),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
        }
    }

    fn holds(&self, ordering: Option<Ordering>) -> bool {
        match (self, ordering) {
            (Comparator::Ne, None) => true,
            (_, None) => false,
            (Comparator::Eq, Some(o)) => o == Ordering::Equal,
            (Comparator::Ne, Some(o)) => o != Ordering::Equal,
            (Comparator::Gt, Some(o)) => o == Ordering::Greater,
            (Comparator::Ge, Some(o)) => o != Ordering::Less,
            (Comparator::Lt, Some(o)) => o == Ordering::Less,
            (Comparator::Le, Some(o)) => o != Ordering::Greater,
        }
    }
}

/// Parsed `<path> <comparator> <literal>` expression
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub path: PathAddress,
    pub comparator: Comparator,
    pub literal: Value,
}

impl Condition {
    /// Parse an expression. The literal is JSON (`500`, `true`, `"gold"`);
    /// a bare word is taken as a string.
    pub fn parse(expr: &str) -> Result<Self, ConditionError> {
        let (at, token, comparator) = expr
            .char_indices()
            .find_map(|(i, _)| {
                Comparator::TOKENS
                    .iter()
                    .find(|(token, _)| expr[i..].starts_with(token))
                    .map(|(token, comparator)| (i, *token, *comparator))
            })
            .ok_or_else(|| ConditionError::MissingComparator(expr.to_owned()))?;

        let path = PathAddress::parse(expr[..at].trim())?;
        let literal = expr[at + token.len()..].trim();
        if literal.is_empty() {
            return Err(ConditionError::MissingLiteral(expr.to_owned()));
        }
        let literal = serde_json::from_str(literal).unwrap_or_else(|_| Value::from(literal));

        Ok(Self {
            path,
            comparator,
            literal,
        })
    }

    /// Whether the condition holds for `tree`. Absent values never satisfy
    /// anything but `!=`.
    pub fn evaluate(&self, tree: &Value) -> bool {
        let ordering = path::lookup(tree, &self.path)
            .present()
            .and_then(|value| compare(value, &self.literal));
        self.comparator.holds(ordering)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.path, self.comparator.as_str(), self.literal)
    }
}

/// Order two values of the same kind; `None` when they are incomparable
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (a, b) if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

/// One achievement and the condition that unlocks it
#[derive(Debug, Clone, PartialEq)]
pub struct AchievementRule {
    pub id: String,
    pub description: String,
    pub condition: Condition,
}

/// Serialized rule definition
#[derive(Debug, Clone, Deserialize)]
pub struct RuleDefinition {
    pub id: String,
    pub condition: String,
    #[serde(default)]
    pub description: String,
}

/// Registered achievement rules
#[derive(Debug, Clone, Default)]
pub struct AchievementBook {
    rules: Vec<AchievementRule>,
}

impl AchievementBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON array of `{id, condition, description?}`
    pub fn from_json(json: &str) -> Result<Self, ConditionError> {
        let definitions: Vec<RuleDefinition> =
            serde_json::from_str(json).map_err(|e| ConditionError::Definitions(e.to_string()))?;
        let mut book = Self::new();
        for def in definitions {
            book.register(def.id, &def.condition, def.description)?;
        }
        Ok(book)
    }

    /// Add a rule, parsing its condition now
    pub fn register(
        &mut self,
        id: impl Into<String>,
        condition: &str,
        description: impl Into<String>,
    ) -> Result<(), ConditionError> {
        let id = id.into();
        if self.rules.iter().any(|rule| rule.id == id) {
            return Err(ConditionError::DuplicateRule(id));
        }
        let condition = Condition::parse(condition)?;
        self.rules.push(AchievementRule {
            id,
            description: description.into(),
            condition,
        });
        Ok(())
    }

    pub fn rules(&self) -> &[AchievementRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Ids whose condition holds and that are not yet unlocked in `tree`
    pub fn evaluate(&self, tree: &Value) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|rule| !is_unlocked(tree, &rule.id) && rule.condition.evaluate(tree))
            .map(|rule| rule.id.as_str())
            .collect()
    }

    /// The `achievements` sequence with newly earned ids appended, or `None`
    /// if nothing new was earned
    pub fn unlocked_list(&self, tree: &Value) -> Option<(Value, Vec<String>)> {
        let earned: Vec<String> = self.evaluate(tree).into_iter().map(str::to_owned).collect();
        if earned.is_empty() {
            return None;
        }
        let mut list = match tree.get(ACHIEVEMENTS_FIELD) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        list.extend(earned.iter().cloned().map(Value::from));
        Some((Value::Array(list), earned))
    }

    /// Append newly earned ids to `tree`'s `achievements`, returning them
    pub fn unlock_new(&self, tree: &mut Value) -> Result<Vec<String>, PathError> {
        match self.unlocked_list(tree) {
            Some((list, earned)) => {
                path::set(tree, ACHIEVEMENTS_FIELD, list)?;
                Ok(earned)
            }
            None => Ok(Vec::new()),
        }
    }
}

/// Whether `id` is already in `tree`'s `achievements`
pub fn is_unlocked(tree: &Value, id: &str) -> bool {
    match tree.get(ACHIEVEMENTS_FIELD) {
        Some(Value::Array(items)) => items.iter().any(|item| item.as_str() == Some(id)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_condition() {
        let condition = Condition::parse("stats.gitSurvivor.highScore >= 1000").unwrap();
        assert_eq!(condition.path.as_str(), "stats.gitSurvivor.highScore");
        assert_eq!(condition.comparator, Comparator::Ge);
        assert_eq!(condition.literal, json!(1000));
        assert_eq!(condition.to_string(), "stats.gitSurvivor.highScore >= 1000");

        let condition = Condition::parse("settings.theme==dark").unwrap();
        assert_eq!(condition.comparator, Comparator::Eq);
        assert_eq!(condition.literal, json!("dark"));

        let condition = Condition::parse(r#"profile.title != "a<b""#).unwrap();
        assert_eq!(condition.comparator, Comparator::Ne);
        assert_eq!(condition.literal, json!("a<b"));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            Condition::parse("stats.score"),
            Err(ConditionError::MissingComparator("stats.score".into()))
        );
        assert!(matches!(
            Condition::parse("stats.score >"),
            Err(ConditionError::MissingLiteral(_))
        ));
        assert!(matches!(
            Condition::parse(" > 5"),
            Err(ConditionError::Path(PathError::EmptyPath))
        ));
    }

    #[test]
    fn test_evaluate() {
        let tree = json!({"stats": {"score": 500, "ratio": 0.5, "name": "ada"}, "flag": true});
        assert!(Condition::parse("stats.score >= 500").unwrap().evaluate(&tree));
        assert!(!Condition::parse("stats.score > 500").unwrap().evaluate(&tree));
        assert!(Condition::parse("stats.score == 500.0").unwrap().evaluate(&tree));
        assert!(Condition::parse("stats.ratio < 1").unwrap().evaluate(&tree));
        assert!(Condition::parse("stats.name == ada").unwrap().evaluate(&tree));
        assert!(Condition::parse("flag == true").unwrap().evaluate(&tree));
        // Absent or mismatched values
        assert!(!Condition::parse("stats.missing >= 0").unwrap().evaluate(&tree));
        assert!(Condition::parse("stats.missing != 0").unwrap().evaluate(&tree));
        assert!(!Condition::parse("stats.name > 3").unwrap().evaluate(&tree));
    }

    #[test]
    fn test_book_unlocks_once() {
        let mut book = AchievementBook::new();
        book.register("high_roller", "stats.score >= 1000", "Score 1000")
            .unwrap();
        book.register("regular", "stats.plays >= 10", "").unwrap();
        assert!(matches!(
            book.register("regular", "stats.plays >= 20", ""),
            Err(ConditionError::DuplicateRule(_))
        ));

        let mut tree = json!({"stats": {"score": 1200, "plays": 3}, "achievements": ["old"]});
        assert_eq!(book.evaluate(&tree), vec!["high_roller"]);

        let earned = book.unlock_new(&mut tree).unwrap();
        assert_eq!(earned, vec!["high_roller".to_string()]);
        assert_eq!(tree["achievements"], json!(["old", "high_roller"]));

        // Already unlocked ids are not earned again
        assert!(book.unlock_new(&mut tree).unwrap().is_empty());
        assert!(is_unlocked(&tree, "high_roller"));
    }

    #[test]
    fn test_book_from_json() {
        let book = AchievementBook::from_json(
            r#"[
                {"id": "survivor", "condition": "stats.gitSurvivor.bestWave >= 10"},
                {"id": "veteran", "condition": "stats.global.sessions > 50", "description": "Keep coming back"}
            ]"#,
        )
        .unwrap();
        assert_eq!(book.len(), 2);
        assert_eq!(book.rules()[1].description, "Keep coming back");

        assert!(matches!(
            AchievementBook::from_json(r#"[{"id": "x", "condition": "nope"}]"#),
            Err(ConditionError::MissingComparator(_))
        ));
        assert!(matches!(
            AchievementBook::from_json("{}"),
            Err(ConditionError::Definitions(_))
        ));
    }
}
