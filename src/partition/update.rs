//! Document updates
//!
//! Writers only ever produce the flat encoding. `Flatten` is conditional:
//! it rewrites an attribute only while it is still legacy-wrapped, so a
//! concurrent flat write is never clobbered with a stale value.

use serde::{Deserialize, Serialize};

use super::filter::Filter;
use crate::document::{DocumentId, LegacyValueNormalizer, Member, Value};

/// One attribute-level modification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum UpdateOp {
    /// Set an attribute to a flat value
    Set { field: String, value: Value },
    /// Remove an attribute
    Unset { field: String },
    /// Replace a legacy-wrapped attribute by its logical value
    Flatten { field: String },
}

impl UpdateOp {
    /// Applies to a member; returns true if the member changed.
    pub fn apply(&self, member: &mut Member) -> bool {
        match self {
            UpdateOp::Set { field, value } => {
                if member.raw(field) == Some(value) {
                    return false;
                }
                member.set(field.clone(), value.clone());
                true
            }
            UpdateOp::Unset { field } => member.remove(field).is_some(),
            UpdateOp::Flatten { field } => {
                let flat = match member.raw(field) {
                    Some(raw) if LegacyValueNormalizer::is_legacy(raw) => {
                        LegacyValueNormalizer::flatten(raw)
                    }
                    _ => return false,
                };
                member.set(field.clone(), flat);
                true
            }
        }
    }
}

/// Ordered list of modifications applied together
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Update {
    ops: Vec<UpdateOp>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Set {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.ops.push(UpdateOp::Unset {
            field: field.into(),
        });
        self
    }

    pub fn flatten(mut self, field: impl Into<String>) -> Self {
        self.ops.push(UpdateOp::Flatten {
            field: field.into(),
        });
        self
    }

    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Applies every op in order; true if anything changed.
    pub fn apply(&self, member: &mut Member) -> bool {
        self.ops
            .iter()
            .fold(false, |changed, op| op.apply(member) | changed)
    }
}

/// A conditional single-document write inside a bulk request
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentWrite {
    pub id: DocumentId,
    /// Re-checked against the current document at write time
    pub condition: Option<Filter>,
    pub update: Update,
}

impl DocumentWrite {
    pub fn new(id: DocumentId, update: Update) -> Self {
        Self {
            id,
            condition: None,
            update,
        }
    }

    pub fn when(mut self, condition: Filter) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Outcome of a multi-document write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteSummary {
    /// Documents that satisfied the filter or condition
    pub matched: u64,
    /// Documents actually changed
    pub modified: u64,
}

impl WriteSummary {
    pub fn merge(&mut self, other: WriteSummary) {
        self.matched += other.matched;
        self.modified += other.modified;
    }
}
