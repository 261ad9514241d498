//! Legacy value normalization
//!
//! Member attributes exist in two encodings:
//!
//! - flat: `attribute: <value>`
//! - legacy-wrapped: `attribute: {"value": <value>, "visible": <bool>}`
//!
//! Every read path goes through [`LegacyValueNormalizer::unwrap`] so that
//! callers observe the same logical value regardless of encoding.

use super::value::Value;

const VALUE_KEY: &str = "value";
const VISIBLE_KEY: &str = "visible";

/// Result of unwrapping a raw attribute value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unwrapped<'a> {
    /// The logical value
    pub value: &'a Value,
    /// Whether the raw value was in the legacy `{value, visible}` form
    pub was_legacy: bool,
    /// `visible` flag carried by the outermost wrapper, if any
    pub legacy_visible: Option<bool>,
}

impl Unwrapped<'_> {
    /// Owned flat value
    pub fn into_flat(self) -> Value {
        self.value.clone()
    }
}

/// Pure decoder for the legacy attribute encoding
pub struct LegacyValueNormalizer;

impl LegacyValueNormalizer {
    /// Unwraps a raw attribute value.
    ///
    /// A map is treated as wrapped only when its keys are exactly `value`, or
    /// `value` and `visible`. The flag is reported only when `visible` is a
    /// bool. Nested wrappers are peeled until a flat value remains.
    pub fn unwrap(raw: &Value) -> Unwrapped<'_> {
        let mut current = raw;
        let mut was_legacy = false;
        let mut legacy_visible = None;

        while let Some((inner, visible)) = Self::peel(current) {
            if !was_legacy {
                legacy_visible = visible;
            }
            was_legacy = true;
            current = inner;
        }

        Unwrapped {
            value: current,
            was_legacy,
            legacy_visible,
        }
    }

    /// Returns true if the raw value is in the legacy form.
    pub fn is_legacy(raw: &Value) -> bool {
        Self::peel(raw).is_some()
    }

    /// Flat encoding of a raw value (clones only the logical part).
    pub fn flatten(raw: &Value) -> Value {
        Self::unwrap(raw).into_flat()
    }

    /// Unwraps an optional raw value; absent stays absent.
    pub fn unwrap_opt(raw: Option<&Value>) -> Option<&Value> {
        raw.map(|v| Self::unwrap(v).value)
    }

    fn peel(raw: &Value) -> Option<(&Value, Option<bool>)> {
        let map = raw.as_map()?;
        let inner = map.get(VALUE_KEY)?;

        match map.len() {
            1 => Some((inner, None)),
            2 => match map.get(VISIBLE_KEY)? {
                Value::Bool(b) => Some((inner, Some(*b))),
                _ => Some((inner, None)),
            },
            _ => None,
        }
    }
}

/// Returns false for absent, null and empty-string values (after unwrapping).
pub fn has_meaningful_value(raw: Option<&Value>) -> bool {
    match LegacyValueNormalizer::unwrap_opt(raw) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrapped(inner: Value, visible: Option<bool>) -> Value {
        let mut entries = vec![("value", inner)];
        if let Some(v) = visible {
            entries.push(("visible", Value::Bool(v)));
        }
        Value::map(entries)
    }

    #[test]
    fn test_flat_scalar_passes_through() {
        let raw = Value::from("Male");
        let u = LegacyValueNormalizer::unwrap(&raw);
        assert_eq!(u.value, &raw);
        assert!(!u.was_legacy);
        assert_eq!(u.legacy_visible, None);
    }

    #[test]
    fn test_wrapped_with_visible() {
        let raw = wrapped(Value::from("Male"), Some(true));
        let u = LegacyValueNormalizer::unwrap(&raw);
        assert_eq!(u.value, &Value::from("Male"));
        assert!(u.was_legacy);
        assert_eq!(u.legacy_visible, Some(true));
    }

    #[test]
    fn test_wrapped_without_visible() {
        let raw = wrapped(Value::Null, None);
        let u = LegacyValueNormalizer::unwrap(&raw);
        assert_eq!(u.value, &Value::Null);
        assert!(u.was_legacy);
    }

    #[test]
    fn test_extra_keys_are_never_wrapped() {
        let raw = Value::map([
            ("value", Value::from(1)),
            ("visible", Value::Bool(true)),
            ("unit", Value::from("kg")),
        ]);
        let u = LegacyValueNormalizer::unwrap(&raw);
        assert!(!u.was_legacy);
        assert_eq!(u.value, &raw);

        let other = Value::map([("label", Value::from("x")), ("visible", Value::Bool(false))]);
        assert!(!LegacyValueNormalizer::is_legacy(&other));
    }

    #[test]
    fn test_non_bool_visible_is_still_wrapped() {
        let raw = Value::map([("value", Value::from("Male")), ("visible", Value::from("true"))]);
        let u = LegacyValueNormalizer::unwrap(&raw);
        assert!(u.was_legacy);
        assert_eq!(u.value, &Value::from("Male"));
        assert_eq!(u.legacy_visible, None);
    }

    #[test]
    fn test_unwrap_is_idempotent() {
        let samples = vec![
            Value::Null,
            Value::from(3),
            wrapped(Value::from("a"), Some(false)),
            wrapped(wrapped(Value::from(7), Some(true)), Some(false)),
            Value::map([("value", Value::from(1)), ("other", Value::Null)]),
        ];

        for raw in samples {
            let once = LegacyValueNormalizer::unwrap(&raw);
            let twice = LegacyValueNormalizer::unwrap(once.value);
            assert_eq!(twice.value, once.value);
            assert!(!twice.was_legacy);
        }
    }

    #[test]
    fn test_nested_wrapper_keeps_outer_visibility() {
        let raw = wrapped(wrapped(Value::from(7), Some(true)), Some(false));
        let u = LegacyValueNormalizer::unwrap(&raw);
        assert_eq!(u.value, &Value::from(7));
        assert_eq!(u.legacy_visible, Some(false));
    }

    #[test]
    fn test_meaningful_values() {
        assert!(!has_meaningful_value(None));
        assert!(!has_meaningful_value(Some(&Value::Null)));
        assert!(!has_meaningful_value(Some(&Value::from(""))));
        assert!(!has_meaningful_value(Some(&wrapped(Value::from(""), Some(true)))));
        assert!(has_meaningful_value(Some(&Value::from(0))));
        assert!(has_meaningful_value(Some(&Value::Bool(false))));
        assert!(has_meaningful_value(Some(&wrapped(Value::from("x"), None))));
    }
}
