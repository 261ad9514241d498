//! Member documents
//!
//! A member is identified by an id unique only within its partition and
//! carries an open set of attributes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::errors::{DocumentError, DocumentResult};
use super::legacy::{LegacyValueNormalizer, Unwrapped};
use super::value::Value;

/// Key carrying the document id in the JSON form
pub const ID_KEY: &str = "_id";

/// Attributes maintained by the store rather than by schema evolution
pub const SYSTEM_ATTRIBUTES: &[&str] = &[ID_KEY, "createdAt", "updatedAt", "__v"];

/// Returns true for attributes that are never treated as schema fields
pub fn is_system_attribute(name: &str) -> bool {
    SYSTEM_ATTRIBUTES.contains(&name)
}

/// Document id, unique within one partition
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A semi-structured member record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "JsonValue", into = "JsonValue")]
pub struct Member {
    id: DocumentId,
    attributes: BTreeMap<String, Value>,
}

impl Member {
    pub fn new(id: DocumentId) -> Self {
        Self {
            id,
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Stored value, in whatever encoding it was written with
    pub fn raw(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Normalized read of one attribute
    pub fn attribute(&self, name: &str) -> Option<Unwrapped<'_>> {
        self.attributes.get(name).map(LegacyValueNormalizer::unwrap)
    }

    /// Logical value of one attribute
    pub fn value(&self, name: &str) -> Option<&Value> {
        LegacyValueNormalizer::unwrap_opt(self.attributes.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Names of attributes still stored in the legacy encoding
    pub fn legacy_attributes(&self) -> Vec<&str> {
        self.attributes
            .iter()
            .filter(|(_, v)| LegacyValueNormalizer::is_legacy(v))
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// Copy with every attribute in the flat encoding
    pub fn normalized(&self) -> Member {
        Member {
            id: self.id.clone(),
            attributes: self
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), LegacyValueNormalizer::flatten(v)))
                .collect(),
        }
    }

    /// Row form used by filters and aggregation: attributes plus `_id`.
    pub fn to_row(&self) -> BTreeMap<String, Value> {
        let mut row = self.attributes.clone();
        row.insert(ID_KEY.to_string(), Value::String(self.id.0.clone()));
        row
    }

    /// Parses a stored document; `_id` must be a string or number.
    pub fn from_json(json: JsonValue) -> DocumentResult<Self> {
        let obj = match json {
            JsonValue::Object(obj) => obj,
            other => {
                return Err(DocumentError::NotAnObject(
                    Value::from_json(other).type_name().to_string(),
                ))
            }
        };

        let mut id = None;
        let mut attributes = BTreeMap::new();
        for (key, value) in obj {
            if key == ID_KEY {
                id = Some(match value {
                    JsonValue::String(s) => DocumentId(s),
                    JsonValue::Number(n) => DocumentId(n.to_string()),
                    other => {
                        return Err(DocumentError::InvalidId(other.to_string()));
                    }
                });
            } else {
                attributes.insert(key, Value::from_json(value));
            }
        }

        let id = id.ok_or(DocumentError::MissingId)?;
        Ok(Self { id, attributes })
    }

    /// Parses a new document, generating an id when `_id` is absent.
    pub fn from_json_or_generate(json: JsonValue) -> DocumentResult<Self> {
        match json {
            JsonValue::Object(mut obj) if !obj.contains_key(ID_KEY) => {
                obj.insert(
                    ID_KEY.to_string(),
                    JsonValue::String(DocumentId::generate().0),
                );
                Self::from_json(JsonValue::Object(obj))
            }
            other => Self::from_json(other),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        let mut obj = serde_json::Map::new();
        obj.insert(ID_KEY.to_string(), JsonValue::String(self.id.0.clone()));
        for (k, v) in &self.attributes {
            obj.insert(k.clone(), v.to_json());
        }
        JsonValue::Object(obj)
    }
}

impl TryFrom<JsonValue> for Member {
    type Error = DocumentError;

    fn try_from(json: JsonValue) -> Result<Self, Self::Error> {
        Member::from_json(json)
    }
}

impl From<Member> for JsonValue {
    fn from(member: Member) -> Self {
        member.to_json()
    }
}
