//! Field name rules

use std::sync::OnceLock;

use regex::Regex;

use super::errors::{FieldError, FieldResult};

fn field_name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok())
        .as_ref()
}

/// Accepts identifiers: a letter or underscore, then letters, digits or
/// underscores.
pub fn validate_field_name(name: &str) -> FieldResult<()> {
    if field_name_pattern().is_some_and(|re| re.is_match(name)) {
        Ok(())
    } else {
        Err(FieldError::InvalidFieldName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["score", "_hidden", "booth_no2", "A"] {
            assert!(validate_field_name(name).is_ok(), "{}", name);
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", "2fast", "has space", "dash-ed", "dot.ted", "$set"] {
            assert_eq!(
                validate_field_name(name),
                Err(FieldError::InvalidFieldName(name.to_string()))
            );
        }
    }
}
