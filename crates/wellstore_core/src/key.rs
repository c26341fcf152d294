//! Index keys, key paths and key ranges.
//!
//! Key ordering: numbers < strings < arrays. Numbers use the IEEE total
//! order, strings compare bytewise, arrays compare element by element with a
//! proper prefix sorting first. Booleans, nulls and objects are not keys;
//! a record whose indexed field holds one is left out of that index.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Bound, RangeBounds};

/// A value usable as an index key.
#[derive(Debug, Clone)]
pub enum KeyValue {
    /// Numeric key (timestamps, scores).
    Number(f64),
    /// Text key (ids, ISO dates, statuses).
    Text(String),
    /// Array key, produced by compound key paths.
    Array(Vec<KeyValue>),
}

impl KeyValue {
    /// Converts a JSON value into a key, if it is a valid key.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(KeyValue::Number),
            Value::String(s) => Some(KeyValue::Text(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(KeyValue::from_json)
                .collect::<Option<Vec<_>>>()
                .map(KeyValue::Array),
            Value::Null | Value::Bool(_) | Value::Object(_) => None,
        }
    }

    /// Converts the key back into JSON (for display and CLI output).
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            KeyValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            KeyValue::Text(s) => Value::String(s.clone()),
            KeyValue::Array(items) => Value::Array(items.iter().map(KeyValue::to_json).collect()),
        }
    }

    /// Returns true if this is an array key whose leading elements equal `prefix`.
    #[must_use]
    pub fn starts_with(&self, prefix: &[KeyValue]) -> bool {
        match self {
            KeyValue::Array(items) => items.len() >= prefix.len() && items[..prefix.len()] == *prefix,
            _ => false,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            KeyValue::Number(_) => 0,
            KeyValue::Text(_) => 1,
            KeyValue::Array(_) => 2,
        }
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyValue {}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyValue::Number(a), KeyValue::Number(b)) => a.total_cmp(b),
            (KeyValue::Text(a), KeyValue::Text(b)) => a.as_bytes().cmp(b.as_bytes()),
            (KeyValue::Array(a), KeyValue::Array(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        KeyValue::Text(value.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> Self {
        KeyValue::Text(value)
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        KeyValue::Number(value as f64)
    }
}

impl From<f64> for KeyValue {
    fn from(value: f64) -> Self {
        KeyValue::Number(value)
    }
}

impl From<Vec<KeyValue>> for KeyValue {
    fn from(value: Vec<KeyValue>) -> Self {
        KeyValue::Array(value)
    }
}

/// Where a key is read from in a record.
///
/// Field names may be dotted (`"meta.source"`) to reach nested objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPath {
    /// One field.
    Single(String),
    /// Ordered tuple of fields; yields an array key.
    Compound(Vec<String>),
}

impl KeyPath {
    /// Creates a single-field key path.
    pub fn single(field: impl Into<String>) -> Self {
        KeyPath::Single(field.into())
    }

    /// Creates a compound key path.
    pub fn compound<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        KeyPath::Compound(fields.into_iter().map(Into::into).collect())
    }

    /// Returns true for compound key paths.
    #[must_use]
    pub fn is_compound(&self) -> bool {
        matches!(self, KeyPath::Compound(_))
    }

    /// Returns the fields this path reads, in order.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        match self {
            KeyPath::Single(f) => vec![f.as_str()],
            KeyPath::Compound(fs) => fs.iter().map(String::as_str).collect(),
        }
    }

    /// Extracts the key from a record. `None` if any field is missing or
    /// holds a non-key value.
    #[must_use]
    pub fn extract(&self, record: &Value) -> Option<KeyValue> {
        match self {
            KeyPath::Single(field) => lookup_field(record, field).and_then(KeyValue::from_json),
            KeyPath::Compound(fields) => fields
                .iter()
                .map(|f| lookup_field(record, f).and_then(KeyValue::from_json))
                .collect::<Option<Vec<_>>>()
                .map(KeyValue::Array),
        }
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPath::Single(field) => write!(f, "{field}"),
            KeyPath::Compound(fields) => write!(f, "[{}]", fields.join(", ")),
        }
    }
}

/// Reads a possibly dotted field from a JSON object.
#[must_use]
pub fn lookup_field<'a>(record: &'a Value, field: &str) -> Option<&'a Value> {
    field
        .split('.')
        .try_fold(record, |current, part| current.as_object()?.get(part))
}

/// A range of keys for index queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    lower: Bound<KeyValue>,
    upper: Bound<KeyValue>,
}

impl KeyRange {
    /// Every key.
    #[must_use]
    pub fn all() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Exactly `key`.
    pub fn only(key: impl Into<KeyValue>) -> Self {
        let key = key.into();
        Self {
            lower: Bound::Included(key.clone()),
            upper: Bound::Included(key),
        }
    }

    /// Keys `>= key`.
    pub fn at_least(key: impl Into<KeyValue>) -> Self {
        Self {
            lower: Bound::Included(key.into()),
            upper: Bound::Unbounded,
        }
    }

    /// Keys `> key`.
    pub fn greater_than(key: impl Into<KeyValue>) -> Self {
        Self {
            lower: Bound::Excluded(key.into()),
            upper: Bound::Unbounded,
        }
    }

    /// Keys `<= key`.
    pub fn at_most(key: impl Into<KeyValue>) -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Included(key.into()),
        }
    }

    /// Keys `< key`.
    pub fn less_than(key: impl Into<KeyValue>) -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Excluded(key.into()),
        }
    }

    /// Keys between `min` and `max`, both inclusive.
    pub fn between(min: impl Into<KeyValue>, max: impl Into<KeyValue>) -> Self {
        Self {
            lower: Bound::Included(min.into()),
            upper: Bound::Included(max.into()),
        }
    }

    /// Returns true if `key` falls inside the range.
    #[must_use]
    pub fn contains_key(&self, key: &KeyValue) -> bool {
        self.contains(key)
    }

    /// Returns true if no key can satisfy the range. `BTreeMap::range`
    /// panics on such bounds, so queries check this first.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(lo), Bound::Included(hi)) => lo > hi,
            (Bound::Included(lo), Bound::Excluded(hi))
            | (Bound::Excluded(lo), Bound::Included(hi))
            | (Bound::Excluded(lo), Bound::Excluded(hi)) => lo >= hi,
            _ => false,
        }
    }
}

impl RangeBounds<KeyValue> for KeyRange {
    fn start_bound(&self) -> Bound<&KeyValue> {
        self.lower.as_ref()
    }

    fn end_bound(&self) -> Bound<&KeyValue> {
        self.upper.as_ref()
    }
}

impl From<KeyValue> for KeyRange {
    fn from(key: KeyValue) -> Self {
        KeyRange::only(key)
    }
}

impl From<&str> for KeyRange {
    fn from(key: &str) -> Self {
        KeyRange::only(key)
    }
}

impl From<String> for KeyRange {
    fn from(key: String) -> Self {
        KeyRange::only(key)
    }
}

impl From<i64> for KeyRange {
    fn from(key: i64) -> Self {
        KeyRange::only(key)
    }
}
