//! Attribute values stored on member documents
//!
//! Members carry an open attribute schema, so every attribute value is one
//! of a closed set of variants. JSON is the interchange format; timestamps
//! travel as `{"$date": "<RFC3339>"}` objects.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Key used by the extended-JSON timestamp encoding.
const DATE_KEY: &str = "$date";

/// A single attribute value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "JsonValue", into = "JsonValue")]
pub enum Value {
    /// Explicit null
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Any numeric value
    Number(f64),
    /// UTF-8 string
    String(String),
    /// Point in time (UTC)
    Timestamp(DateTime<Utc>),
    /// Ordered list
    Sequence(Vec<Value>),
    /// Nested object
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Builds a map value from `(key, value)` pairs.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Variant name used in error messages and type reports
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Timestamp(_) => "timestamp",
            Value::Sequence(_) => "sequence",
            Value::Map(_) => "map",
        }
    }

    /// Total ordering used by sorts and range comparisons.
    ///
    /// Variants order as null < bool < number < string < timestamp <
    /// sequence < map; values of the same variant compare naturally. Maps
    /// compare entry by entry in key order.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        let rank = |v: &Value| -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Number(_) => 2,
                Value::String(_) => 3,
                Value::Timestamp(_) => 4,
                Value::Sequence(_) => 5,
                Value::Map(_) => 6,
            }
        };

        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Sequence(a), Value::Sequence(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.total_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Map(a), Value::Map(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                    let ord = ka.cmp(kb).then_with(|| va.total_cmp(vb));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => rank(self).cmp(&rank(other)),
        }
    }

    /// Converts a JSON value, recognizing the `{"$date": ...}` encoding.
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(items) => {
                Value::Sequence(items.into_iter().map(Value::from_json).collect())
            }
            JsonValue::Object(obj) => {
                if obj.len() == 1 {
                    if let Some(JsonValue::String(raw)) = obj.get(DATE_KEY) {
                        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
                            return Value::Timestamp(ts.with_timezone(&Utc));
                        }
                    }
                }
                Value::Map(
                    obj.into_iter()
                        .map(|(k, v)| (k, Value::from_json(v)))
                        .collect(),
                )
            }
        }
    }

    /// Converts to JSON. Integral numbers become JSON integers.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Timestamp(ts) => {
                let mut obj = serde_json::Map::new();
                obj.insert(DATE_KEY.to_string(), JsonValue::String(ts.to_rfc3339()));
                JsonValue::Object(obj)
            }
            Value::Sequence(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

fn number_to_json(n: f64) -> JsonValue {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        return JsonValue::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        Value::from_json(json)
    }
}

impl From<Value> for JsonValue {
    fn from(value: Value) -> Self {
        value.to_json()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
