//! Field descriptors
//!
//! One descriptor per logical field name, global across tenants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{FieldType, LegacyValueNormalizer, Value};

/// Metadata describing one logical attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Backfilled into documents lacking the attribute
    #[serde(default)]
    pub default: Option<Value>,
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
    pub visible: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FieldDescriptor {
    /// Descriptor inferred from stored documents for an undescribed field
    pub fn synthesized(name: impl Into<String>, field_type: FieldType, visible: bool) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            label: name.clone(),
            name,
            field_type,
            required: false,
            default: None,
            description: None,
            visible,
            created_at: now,
            updated_at: now,
        }
    }

    /// Value written into documents that lack the attribute. Defaults are
    /// held in the flat encoding.
    pub fn backfill_value(&self) -> Value {
        self.default.clone().unwrap_or(Value::Null)
    }

    /// Applies a partial update and bumps `updated_at`.
    pub fn apply(&mut self, patch: &FieldPatch) {
        if let Some(field_type) = patch.field_type {
            self.field_type = field_type;
        }
        if let Some(required) = patch.required {
            self.required = required;
        }
        if let Some(default) = &patch.default {
            self.default = Some(LegacyValueNormalizer::flatten(default));
        }
        if let Some(label) = &patch.label {
            self.label = label.clone();
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(visible) = patch.visible {
            self.visible = visible;
        }
        self.updated_at = Utc::now();
    }

    /// Same descriptor under another name
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// Request to register a new field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    /// Defaults to the field name
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

impl NewField {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            default: None,
            label: None,
            description: None,
            visible: default_visible(),
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn into_descriptor(self) -> FieldDescriptor {
        let now = Utc::now();
        FieldDescriptor {
            label: self.label.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            field_type: self.field_type,
            required: self.required,
            default: self.default.as_ref().map(LegacyValueNormalizer::flatten),
            description: self.description,
            visible: self.visible,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial descriptor update; absent members are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldPatch {
    #[serde(default, rename = "type")]
    pub field_type: Option<FieldType>,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visible: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_field_defaults() {
        let field: NewField = serde_json::from_value(json!({"name": "score", "type": "Number"})).unwrap();
        assert!(field.visible);
        let descriptor = field.into_descriptor();
        assert_eq!(descriptor.label, "score");
        assert_eq!(descriptor.backfill_value(), Value::Null);
    }

    #[test]
    fn test_patch_is_partial() {
        let mut descriptor = NewField::new("flag", FieldType::Boolean)
            .default_value(false)
            .label("Flag")
            .into_descriptor();
        let before = descriptor.updated_at;
        descriptor.apply(&FieldPatch {
            visible: Some(false),
            ..FieldPatch::default()
        });
        assert!(!descriptor.visible);
        assert_eq!(descriptor.label, "Flag");
        assert_eq!(descriptor.default, Some(Value::Bool(false)));
        assert!(descriptor.updated_at >= before);
    }
}
