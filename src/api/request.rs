//! Service request types
//!
//! Every operation has a JSON form: an object with an `op` discriminator
//! and the operation's arguments alongside it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::errors::{ServiceError, ServiceResult};
use crate::document::{DocumentId, Value};
use crate::fields::{FieldPatch, NewField};
use crate::partition::{Filter, SortSpec};
use crate::tenant::TenantIdentifier;

/// Largest page a single `find_members` call may return
pub const MAX_PAGE_LIMIT: usize = 1000;

fn default_page_limit() -> usize {
    50
}

fn default_sample_size() -> usize {
    500
}

/// Offset paging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_page_limit")]
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: default_page_limit(),
        }
    }
}

impl PageRequest {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    pub fn validate(&self) -> ServiceResult<()> {
        if self.limit == 0 || self.limit > MAX_PAGE_LIMIT {
            return Err(ServiceError::InvalidRequest(format!(
                "page limit must be between 1 and {}, got {}",
                MAX_PAGE_LIMIT, self.limit
            )));
        }
        Ok(())
    }

    /// Rows a cross-partition fetch must gather before skipping `offset`
    pub fn window(&self) -> usize {
        self.offset.saturating_add(self.limit)
    }
}

/// Arguments of `find_members`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindMembersRequest {
    /// One tenant, or every tenant when absent
    #[serde(default)]
    pub tenant: Option<TenantIdentifier>,
    #[serde(default)]
    pub filter: Filter,
    #[serde(default)]
    pub sort: Option<SortSpec>,
    #[serde(default)]
    pub page: PageRequest,
}

/// Attribute values written by `update_member_by_id`
pub type MemberPatch = BTreeMap<String, Value>;

/// Request envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    ResolveTenant {
        tenant: TenantIdentifier,
    },
    CountMembers {
        #[serde(default)]
        tenant: Option<TenantIdentifier>,
        #[serde(default)]
        filter: Filter,
    },
    FindMembers(FindMembersRequest),
    FindMemberById {
        id: DocumentId,
    },
    UpdateMemberById {
        id: DocumentId,
        patch: MemberPatch,
    },
    ListFieldDescriptors,
    AddField {
        field: NewField,
    },
    UpdateField {
        name: String,
        patch: FieldPatch,
    },
    RenameField {
        from: String,
        to: String,
    },
    DeleteField {
        name: String,
    },
    SetFieldVisibility {
        name: String,
        visible: bool,
    },
    DiscoverFields {
        #[serde(default = "default_sample_size")]
        sample_size: usize,
    },
    FlattenLegacyFields,
    Metrics,
}

const OPERATIONS: &[&str] = &[
    "resolve_tenant",
    "count_members",
    "find_members",
    "find_member_by_id",
    "update_member_by_id",
    "list_field_descriptors",
    "add_field",
    "update_field",
    "rename_field",
    "delete_field",
    "set_field_visibility",
    "discover_fields",
    "flatten_legacy_fields",
    "metrics",
];

impl Request {
    /// Parse a request from a JSON string
    pub fn parse(json: &str) -> ServiceResult<Self> {
        let raw: JsonValue = serde_json::from_str(json)
            .map_err(|e| ServiceError::InvalidRequest(format!("invalid JSON: {}", e)))?;

        let op = raw
            .get("op")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| ServiceError::InvalidRequest("missing op".to_string()))?;
        if !OPERATIONS.contains(&op) {
            return Err(ServiceError::InvalidRequest(format!("unknown operation '{}'", op)));
        }

        serde_json::from_value(raw).map_err(|e| ServiceError::InvalidRequest(e.to_string()))
    }

    /// Operation name as it appears in the `op` field
    pub fn operation(&self) -> &'static str {
        match self {
            Request::ResolveTenant { .. } => "resolve_tenant",
            Request::CountMembers { .. } => "count_members",
            Request::FindMembers(_) => "find_members",
            Request::FindMemberById { .. } => "find_member_by_id",
            Request::UpdateMemberById { .. } => "update_member_by_id",
            Request::ListFieldDescriptors => "list_field_descriptors",
            Request::AddField { .. } => "add_field",
            Request::UpdateField { .. } => "update_field",
            Request::RenameField { .. } => "rename_field",
            Request::DeleteField { .. } => "delete_field",
            Request::SetFieldVisibility { .. } => "set_field_visibility",
            Request::DiscoverFields { .. } => "discover_fields",
            Request::FlattenLegacyFields => "flatten_legacy_fields",
            Request::Metrics => "metrics",
        }
    }
}
