//! Service response types
//!
//! JSON response formatting for all operations.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::errors::ServiceError;
use crate::document::Member;
use crate::fanout::Located;
use crate::tenant::TenantKey;

/// A member together with the tenant that owns it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatedMember {
    pub tenant: TenantKey,
    pub member: Member,
}

impl From<Located<Member>> for LocatedMember {
    fn from(located: Located<Member>) -> Self {
        Self {
            tenant: located.tenant,
            member: located.item,
        }
    }
}

/// One page of `find_members`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberPage {
    pub members: Vec<LocatedMember>,
    /// Matching documents across the queried tenants
    pub total: u64,
    pub offset: usize,
    pub limit: usize,
}

/// Success response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub status: String,
    pub data: JsonValue,
}

impl SuccessResponse {
    pub fn new(data: JsonValue) -> Self {
        Self {
            status: "ok".to_string(),
            data,
        }
    }
}

/// Error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub code: String,
    pub message: String,
    /// HTTP status the transport should answer with
    pub http_status: u16,
}

impl ErrorResponse {
    pub fn from_error(err: &ServiceError) -> Self {
        Self {
            status: "error".to_string(),
            code: err.code().to_string(),
            message: err.to_string(),
            http_status: err.status_code(),
        }
    }
}

/// Unified response type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Success(SuccessResponse),
    Error(ErrorResponse),
}

impl Response {
    /// Serializes `data` into a success response
    pub fn success<T: Serialize>(data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Response::Success(SuccessResponse::new(value)),
            Err(e) => Response::error(&ServiceError::Internal(format!(
                "response serialization failed: {}",
                e
            ))),
        }
    }

    pub fn error(err: &ServiceError) -> Self {
        Response::Error(ErrorResponse::from_error(err))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success(_))
    }

    /// Error code, for error responses
    pub fn code(&self) -> Option<&str> {
        match self {
            Response::Success(_) => None,
            Response::Error(err) => Some(&err.code),
        }
    }

    pub fn to_json(&self) -> String {
        // Both variants hold only strings, numbers and JSON values.
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"status":"error","code":"MEMBERDB_INTERNAL_ERROR","message":"{}","http_status":500}}"#,
                e
            )
        })
    }
}

impl From<Result<JsonValue, ServiceError>> for Response {
    fn from(result: Result<JsonValue, ServiceError>) -> Self {
        match result {
            Ok(data) => Response::Success(SuccessResponse::new(data)),
            Err(err) => Response::error(&err),
        }
    }
}
