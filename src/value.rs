//! Attribute values - the explicit sum type stored in every physical row.
//!
//! Entities travel through the mapper as [`Item`]s: ordered maps from attribute
//! name to [`Value`]. Typed entities are converted through `serde_json`.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value as Json;

/// Token stored in place of `""`, which the underlying store rejects.
pub const EMPTY_STRING_MARKER: &str = "$$empty$$";

/// A physical row or logical entity: attribute name to value.
pub type Item = BTreeMap<String, Value>;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    StringSet(BTreeSet<String>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Version counters are stored as numbers; anything else reads as absent.
    pub fn as_version(&self) -> Option<u64> {
        match self {
            Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as u64),
            _ => None,
        }
    }

    /// String form used when the value becomes part of a hash or range key.
    ///
    /// Only scalars have one; containers return `None`.
    pub fn key_string(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Flattens a key field into its list of candidate values.
    ///
    /// Lists and sets expand; a scalar behaves as a one-element list.
    pub fn key_candidates(&self) -> Vec<String> {
        match self {
            Value::List(values) => values.iter().filter_map(Value::key_string).collect(),
            Value::StringSet(values) => values.iter().cloned().collect(),
            other => other.key_string().into_iter().collect(),
        }
    }

    /// True when this value, or anything nested inside it, is null or NaN.
    pub fn contains_invalid(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Number(n) => n.is_nan(),
            Value::List(values) => values.iter().any(Value::contains_invalid),
            Value::Map(map) => map.values().any(Value::contains_invalid),
            _ => false,
        }
    }

    /// True when any string leaf equals `literal`.
    pub fn contains_string(&self, literal: &str) -> bool {
        match self {
            Value::String(s) => s == literal,
            Value::List(values) => values.iter().any(|v| v.contains_string(literal)),
            Value::Map(map) => map.values().any(|v| v.contains_string(literal)),
            Value::StringSet(set) => set.contains(literal),
            _ => false,
        }
    }

    /// Ordering between two values of the same scalar kind.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            _ => None,
        }
    }

    pub fn from_json(json: Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::String(s),
            Json::Array(values) => Value::List(values.into_iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => Json::String(s.clone()),
            Value::List(values) => Json::Array(values.iter().map(Value::to_json).collect()),
            Value::Map(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::StringSet(set) => Json::Array(set.iter().cloned().map(Json::String).collect()),
        }
    }
}

fn number_to_json(n: f64) -> Json {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Json::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Json::Number)
            .unwrap_or(Json::Null)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Number(value as f64)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

/// Converts a JSON object into an [`Item`]. Non-objects yield `None`.
pub fn item_from_json(json: Json) -> Option<Item> {
    match Value::from_json(json) {
        Value::Map(map) => Some(map),
        _ => None,
    }
}

pub fn item_to_json(item: &Item) -> Json {
    Json::Object(
        item.iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// Replaces every `""` leaf with [`EMPTY_STRING_MARKER`], recursively.
pub fn encode_empty_strings(value: &Value) -> Value {
    substitute(value, "", EMPTY_STRING_MARKER)
}

/// Restores every [`EMPTY_STRING_MARKER`] leaf to `""`, recursively.
pub fn decode_empty_strings(value: &Value) -> Value {
    substitute(value, EMPTY_STRING_MARKER, "")
}

fn substitute(value: &Value, from: &str, to: &str) -> Value {
    match value {
        Value::String(s) if s == from => Value::String(to.to_string()),
        Value::List(values) => Value::List(values.iter().map(|v| substitute(v, from, to)).collect()),
        Value::Map(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, from, to)))
                .collect(),
        ),
        Value::StringSet(set) => Value::StringSet(
            set.iter()
                .map(|s| if s == from { to.to_string() } else { s.clone() })
                .collect(),
        ),
        other => other.clone(),
    }
}
