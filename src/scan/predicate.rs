//! Query predicates
//!
//! A predicate is a conjunction of per-field conditions. Field specs ending
//! in `%` are case-insensitive substring (LIKE) tests; everything else is
//! loose equality.

use crate::record::{Fields, Record, Value, ID_FIELD};

/// Field-name suffix selecting a LIKE test
pub const LIKE_SUFFIX: char = '%';

/// How a condition compares a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    /// Loose equality (`"30"` == `30`); a null value matches a missing field
    Exact,
    /// ASCII case-insensitive substring of a string field
    Like,
}

/// A single `field <op> value` test
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: MatchOp,
    pub value: Value,
}

impl Condition {
    pub fn matches(&self, record: &Record) -> bool {
        let field = record.get(&self.field);
        match self.op {
            MatchOp::Exact => match field {
                Some(v) => v.loose_eq(&self.value),
                None => self.value.is_null(),
            },
            MatchOp::Like => field
                .and_then(Value::as_str)
                .map_or(false, |s| contains_ignore_ascii_case(s, &self.value.to_text())),
        }
    }
}

/// AND-ed set of conditions; empty matches everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    conditions: Vec<Condition>,
}

impl Predicate {
    /// Predicate matching every live record
    pub fn all() -> Self {
        Self::default()
    }

    /// Add an exact-match condition
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            field: field.into(),
            op: MatchOp::Exact,
            value: value.into(),
        });
        self
    }

    /// Add a LIKE condition
    pub fn like(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            field: field.into(),
            op: MatchOp::Like,
            value: value.into(),
        });
        self
    }

    /// Build from a field map (`"name%"` → LIKE on `name`)
    pub fn from_fields(filter: &Fields) -> Self {
        let mut predicate = Self::all();
        for (key, value) in filter {
            predicate = match key.strip_suffix(LIKE_SUFFIX) {
                Some(field) => predicate.like(field, value.clone()),
                None => predicate.eq(key.as_str(), value.clone()),
            };
        }
        predicate
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }

    /// The id to look up directly when this predicate is exactly `{_id: v}`
    pub fn id_lookup(&self) -> Option<String> {
        match self.conditions.as_slice() {
            [Condition {
                field,
                op: MatchOp::Exact,
                value,
            }] if field == ID_FIELD => match value {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Substring test folding ASCII letters only (non-ASCII bytes compare as-is)
pub fn contains_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}
