//! Attribute type inference
//!
//! Used when a field descriptor has to be synthesized from stored data.

use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use super::legacy::LegacyValueNormalizer;
use super::value::Value;

/// Declared or inferred type of a logical field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Null,
    String,
    Number,
    Boolean,
    Date,
    Array,
    Object,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Null => "Null",
            FieldType::String => "String",
            FieldType::Number => "Number",
            FieldType::Boolean => "Boolean",
            FieldType::Date => "Date",
            FieldType::Array => "Array",
            FieldType::Object => "Object",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "null" => Ok(FieldType::Null),
            "string" | "text" => Ok(FieldType::String),
            "number" | "int" | "float" => Ok(FieldType::Number),
            "boolean" | "bool" => Ok(FieldType::Boolean),
            "date" | "timestamp" => Ok(FieldType::Date),
            "array" => Ok(FieldType::Array),
            "object" => Ok(FieldType::Object),
            other => Err(format!("unknown field type '{}'", other)),
        }
    }
}

/// Infers the type of a single raw value (legacy wrappers are unwrapped first).
///
/// Strings holding an RFC3339 timestamp infer as `Date`.
pub fn infer_type(raw: &Value) -> FieldType {
    match LegacyValueNormalizer::unwrap(raw).value {
        Value::Null => FieldType::Null,
        Value::Bool(_) => FieldType::Boolean,
        Value::Number(_) => FieldType::Number,
        Value::Timestamp(_) => FieldType::Date,
        Value::String(s) if DateTime::parse_from_rfc3339(s).is_ok() => FieldType::Date,
        Value::String(_) => FieldType::String,
        Value::Sequence(_) => FieldType::Array,
        Value::Map(_) => FieldType::Object,
    }
}

/// Infers one type from several observations.
///
/// Nulls are ignored; a single concrete type wins; conflicting concrete
/// types resolve to `String`.
pub fn infer_from_samples<'a, I>(samples: I) -> FieldType
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut seen: Option<FieldType> = None;

    for raw in samples {
        let t = infer_type(raw);
        if t == FieldType::Null {
            continue;
        }
        match seen {
            None => seen = Some(t),
            Some(prev) if prev == t => {}
            Some(_) => return FieldType::String,
        }
    }

    seen.unwrap_or(FieldType::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_scalars() {
        assert_eq!(infer_type(&Value::from(1)), FieldType::Number);
        assert_eq!(infer_type(&Value::from("x")), FieldType::String);
        assert_eq!(infer_type(&Value::Bool(true)), FieldType::Boolean);
        assert_eq!(infer_type(&Value::Null), FieldType::Null);
        assert_eq!(infer_type(&Value::Sequence(vec![])), FieldType::Array);
    }

    #[test]
    fn test_infer_through_legacy_wrapper() {
        let raw = Value::map([("value", Value::from(42)), ("visible", Value::Bool(true))]);
        assert_eq!(infer_type(&raw), FieldType::Number);
    }

    #[test]
    fn test_date_strings_are_more_specific() {
        assert_eq!(infer_type(&Value::from("2024-03-01T00:00:00Z")), FieldType::Date);
        assert_eq!(infer_type(&Value::from("2024-03-01")), FieldType::String);
    }

    #[test]
    fn test_samples_skip_nulls() {
        let samples = [Value::Null, Value::from(3), Value::Null];
        assert_eq!(infer_from_samples(samples.iter()), FieldType::Number);
    }

    #[test]
    fn test_conflicting_samples_fall_back_to_string() {
        let samples = [Value::from(3), Value::Bool(true)];
        assert_eq!(infer_from_samples(samples.iter()), FieldType::String);
        assert_eq!(infer_from_samples(std::iter::empty()), FieldType::Null);
    }

    #[test]
    fn test_parse_type_names() {
        assert_eq!("number".parse::<FieldType>().unwrap(), FieldType::Number);
        assert_eq!("Boolean".parse::<FieldType>().unwrap(), FieldType::Boolean);
        assert!("blob".parse::<FieldType>().is_err());
    }
}
