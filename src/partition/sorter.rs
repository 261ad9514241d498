//! Result ordering
//!
//! Sorts compare logical attribute values. Missing attributes sort first,
//! ties keep their input order.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::document::{LegacyValueNormalizer, Member, Value, ID_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Single-key sort specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    fn apply(&self, ordering: Ordering) -> Ordering {
        match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// Sorts members and aggregation rows
pub struct ResultSorter;

impl ResultSorter {
    pub fn sort_members(members: &mut [Member], spec: &SortSpec) {
        members.sort_by(|a, b| Self::compare_members(a, b, spec));
    }

    /// Ordering of two members under `spec`
    pub fn compare_members(a: &Member, b: &Member, spec: &SortSpec) -> Ordering {
        spec.apply(Self::compare(member_key(a, spec), member_key(b, spec)))
    }

    pub fn sort_rows(rows: &mut [BTreeMap<String, Value>], spec: &SortSpec) {
        rows.sort_by(|a, b| {
            spec.apply(Self::compare(
                LegacyValueNormalizer::unwrap_opt(a.get(&spec.field)).cloned(),
                LegacyValueNormalizer::unwrap_opt(b.get(&spec.field)).cloned(),
            ))
        });
    }

    fn compare(a: Option<Value>, b: Option<Value>) -> Ordering {
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.total_cmp(&b),
        }
    }
}

fn member_key(member: &Member, spec: &SortSpec) -> Option<Value> {
    if spec.field == ID_KEY {
        return Some(Value::String(member.id().as_str().to_string()));
    }
    member.value(&spec.field).cloned()
}
