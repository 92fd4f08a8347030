//! Key/value field types shared by events, ambient context and formatters

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Ordered key/value mapping.
///
/// A `BTreeMap` keeps rendering deterministic: the same mapping always
/// serializes with the same key order.
pub type ContextMap = BTreeMap<String, FieldValue>;

/// Value type for context fields, extra attributes and message arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(fl) => write!(f, "{}", fl),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Null => write!(f, "null"),
        }
    }
}

impl FieldValue {
    /// Convert to serde_json::Value for JSON serialization
    #[must_use]
    pub fn to_json_value(&self) -> serde_json::Value {
        match self {
            FieldValue::String(s) => serde_json::Value::String(s.clone()),
            FieldValue::Int(i) => serde_json::Value::Number((*i).into()),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::Null => serde_json::Value::Null,
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<&String> for FieldValue {
    fn from(s: &String) -> Self {
        FieldValue::String(s.clone())
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Int(i64::from(i))
    }
}

impl From<u32> for FieldValue {
    fn from(i: u32) -> Self {
        FieldValue::Int(i64::from(i))
    }
}

impl From<usize> for FieldValue {
    fn from(i: usize) -> Self {
        i64::try_from(i)
            .map(FieldValue::Int)
            .unwrap_or(FieldValue::Float(i as f64))
    }
}

impl From<u64> for FieldValue {
    fn from(i: u64) -> Self {
        i64::try_from(i)
            .map(FieldValue::Int)
            .unwrap_or(FieldValue::Float(i as f64))
    }
}

impl From<f32> for FieldValue {
    fn from(f: f32) -> Self {
        FieldValue::Float(f64::from(f))
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(f)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// Build a [`ContextMap`] from key/value pairs
pub fn fields<K, V, I>(pairs: I) -> ContextMap
where
    K: Into<String>,
    V: Into<FieldValue>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Render a mapping as space separated `key=value` pairs
pub fn format_fields(map: &ContextMap) -> String {
    map.iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_builder() {
        let map = fields([("user_id", FieldValue::from(123)), ("name", "john".into())]);
        assert_eq!(map.len(), 2);
        assert_eq!(map["user_id"], FieldValue::Int(123));
    }

    #[test]
    fn test_format_fields_is_sorted() {
        let map = fields([("b", 2), ("a", 1)]);
        assert_eq!(format_fields(&map), "a=1 b=2");
    }

    #[test]
    fn test_untagged_roundtrip() {
        let map = fields([
            ("s", FieldValue::from("x")),
            ("i", FieldValue::from(7)),
            ("f", FieldValue::from(1.5)),
            ("b", FieldValue::from(true)),
            ("n", FieldValue::Null),
        ]);
        let json = serde_json::to_string(&map).unwrap();
        let back: ContextMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
