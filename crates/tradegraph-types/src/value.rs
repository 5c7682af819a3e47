//! Typed graph values, parameter maps, and store rows.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// A typed graph value.
///
/// Represents values that can appear in query parameters, permission
/// `property_filter` payloads, and rows returned by the permission store.
///
/// `Display` renders the value as a Cypher literal: strings are
/// single-quoted with embedded quotes and backslashes escaped, so a
/// rendered scalar can be spliced into a predicate fragment safely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Absent / null value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Homogeneous or mixed list (used for role lists in audit params).
    List(Vec<Scalar>),
}

impl Scalar {
    /// Converts a JSON value into a scalar.
    ///
    /// Returns `None` for JSON objects and for numbers outside the i64/f64
    /// range, which have no scalar representation.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Scalar::Null),
            serde_json::Value::Bool(b) => Some(Scalar::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Scalar::Int(i))
                } else {
                    n.as_f64().map(Scalar::Float)
                }
            }
            serde_json::Value::String(s) => Some(Scalar::Text(s.clone())),
            serde_json::Value::Array(items) => items
                .iter()
                .map(Scalar::from_json)
                .collect::<Option<Vec<_>>>()
                .map(Scalar::List),
            serde_json::Value::Object(_) => None,
        }
    }

    /// Returns the text content if this is a `Text` scalar.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns whether this scalar is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Text(s) => {
                f.write_str("'")?;
                for ch in s.chars() {
                    match ch {
                        '\'' => f.write_str("\\'")?,
                        '\\' => f.write_str("\\\\")?,
                        other => write!(f, "{other}")?,
                    }
                }
                f.write_str("'")
            }
            Scalar::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Int(i)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

/// Named query parameters (`$name` references).
///
/// Ordered so that rendered queries and log lines are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Params(BTreeMap<String, Scalar>);

impl Params {
    /// Creates an empty parameter map.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Inserts a parameter, replacing any existing value under the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Scalar>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns the value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&Scalar> {
        self.0.get(key)
    }

    /// Returns whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterates over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Scalar)> {
        self.0.iter()
    }

    /// Returns the number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Scalar)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, Scalar)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A named-column row returned by the permission store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(BTreeMap<String, Scalar>);

impl Row {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Sets a column value, replacing any existing one.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Scalar>) {
        self.0.insert(column.into(), value.into());
    }

    /// Returns the value of `column`, if present.
    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.0.get(column)
    }

    /// Returns the text content of `column`, treating `Null` as absent.
    pub fn get_text(&self, column: &str) -> Option<&str> {
        self.0.get(column).and_then(Scalar::as_text)
    }
}

impl FromIterator<(String, Scalar)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Scalar)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
