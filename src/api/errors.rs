//! Service-level errors
//!
//! Subsystem errors are folded into one taxonomy with stable string codes
//! and an HTTP-style status for the transport layer in front of the
//! service.

use thiserror::Error;

use crate::config::ConfigError;
use crate::document::DocumentError;
use crate::fanout::QueryError;
use crate::fields::{FieldError, MetadataError};
use crate::partition::PartitionError;
use crate::tenant::{TenantError, TenantKey};

/// Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    // ==================
    // Client errors
    // ==================
    #[error("unknown tenant {0}")]
    UnknownTenant(TenantKey),

    #[error("no tenant matches '{0}'")]
    AmbiguousOrUnknownTenant(String),

    #[error("invalid field name '{0}'")]
    InvalidFieldName(String),

    #[error("field '{0}' already exists")]
    DuplicateField(String),

    #[error("field '{0}' is protected")]
    CriticalFieldProtected(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // ==================
    // Server errors
    // ==================
    /// A partition failed; `tenant` is unknown when the failing partition
    /// could not be attributed
    #[error("partition transport error: {reason}")]
    PartitionTransport {
        tenant: Option<TenantKey>,
        reason: String,
    },

    /// Multi-partition mutation stopped with `applied` documents committed
    #[error("interrupted at tenant {tenant} after {applied} documents: {reason}")]
    Interrupted {
        tenant: TenantKey,
        applied: u64,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::UnknownTenant(_) => "MEMBERDB_UNKNOWN_TENANT",
            ServiceError::AmbiguousOrUnknownTenant(_) => "MEMBERDB_AMBIGUOUS_OR_UNKNOWN_TENANT",
            ServiceError::InvalidFieldName(_) => "MEMBERDB_INVALID_FIELD_NAME",
            ServiceError::DuplicateField(_) => "MEMBERDB_DUPLICATE_FIELD",
            ServiceError::CriticalFieldProtected(_) => "MEMBERDB_CRITICAL_FIELD_PROTECTED",
            ServiceError::NotFound(_) => "MEMBERDB_NOT_FOUND",
            ServiceError::InvalidRequest(_) => "MEMBERDB_INVALID_REQUEST",
            ServiceError::PartitionTransport { .. } => "MEMBERDB_PARTITION_TRANSPORT_ERROR",
            ServiceError::Interrupted { .. } => "MEMBERDB_PARTIAL_COMPLETION",
            ServiceError::Config(_) => "MEMBERDB_CONFIG_ERROR",
            ServiceError::Internal(_) => "MEMBERDB_INTERNAL_ERROR",
        }
    }

    /// HTTP status for this error
    pub fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            ServiceError::InvalidFieldName(_) => 400,
            ServiceError::InvalidRequest(_) => 400,
            ServiceError::AmbiguousOrUnknownTenant(_) => 400,

            // 403 Forbidden
            ServiceError::CriticalFieldProtected(_) => 403,

            // 404 Not Found
            ServiceError::UnknownTenant(_) => 404,
            ServiceError::NotFound(_) => 404,

            // 409 Conflict
            ServiceError::DuplicateField(_) => 409,

            // 5xx
            ServiceError::PartitionTransport { .. } => 503,
            ServiceError::Interrupted { .. } => 500,
            ServiceError::Config(_) => 500,
            ServiceError::Internal(_) => 500,
        }
    }
}

impl From<TenantError> for ServiceError {
    fn from(err: TenantError) -> Self {
        match err {
            TenantError::UnknownTenant(key) => ServiceError::UnknownTenant(key),
            TenantError::AmbiguousOrUnknownTenant(alias) => ServiceError::AmbiguousOrUnknownTenant(alias),
            TenantError::InvalidConfig(reason) => ServiceError::Config(reason),
            TenantError::Partition { tenant, source } => ServiceError::from_partition(Some(tenant), source),
        }
    }
}

impl From<QueryError> for ServiceError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Tenant(err) => err.into(),
            QueryError::Partition { tenant, source } => ServiceError::from_partition(Some(tenant), source),
        }
    }
}

impl From<FieldError> for ServiceError {
    fn from(err: FieldError) -> Self {
        match err {
            FieldError::InvalidFieldName(name) => ServiceError::InvalidFieldName(name),
            FieldError::DuplicateField(name) => ServiceError::DuplicateField(name),
            FieldError::CriticalFieldProtected(name) => ServiceError::CriticalFieldProtected(name),
            FieldError::NotFound(name) => ServiceError::NotFound(format!("field '{}'", name)),
            FieldError::Metadata(err) => err.into(),
            FieldError::Query(err) => err.into(),
            FieldError::Interrupted {
                tenant,
                applied,
                source,
            } => ServiceError::Interrupted {
                tenant,
                applied,
                reason: source.to_string(),
            },
        }
    }
}

impl From<MetadataError> for ServiceError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::DuplicateKey(name) => ServiceError::DuplicateField(name),
            MetadataError::NotFound(name) => ServiceError::NotFound(format!("field '{}'", name)),
            MetadataError::Unavailable(reason) => ServiceError::Internal(reason),
        }
    }
}

impl From<PartitionError> for ServiceError {
    fn from(err: PartitionError) -> Self {
        ServiceError::from_partition(None, err)
    }
}

impl From<DocumentError> for ServiceError {
    fn from(err: DocumentError) -> Self {
        ServiceError::InvalidRequest(err.to_string())
    }
}

impl From<ConfigError> for ServiceError {
    fn from(err: ConfigError) -> Self {
        ServiceError::Config(err.to_string())
    }
}

impl ServiceError {
    fn from_partition(tenant: Option<TenantKey>, err: PartitionError) -> Self {
        match err {
            PartitionError::InvalidQuery(reason) => ServiceError::InvalidRequest(reason),
            PartitionError::DuplicateId(id) => {
                ServiceError::InvalidRequest(format!("duplicate document id '{}'", id))
            }
            transport => ServiceError::PartitionTransport {
                tenant,
                reason: transport.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_prefixed() {
        let errors = [
            ServiceError::UnknownTenant(TenantKey::new(1)),
            ServiceError::AmbiguousOrUnknownTenant("x".into()),
            ServiceError::InvalidFieldName("x".into()),
            ServiceError::DuplicateField("x".into()),
            ServiceError::CriticalFieldProtected("x".into()),
            ServiceError::NotFound("x".into()),
            ServiceError::InvalidRequest("x".into()),
            ServiceError::PartitionTransport {
                tenant: None,
                reason: "x".into(),
            },
            ServiceError::Interrupted {
                tenant: TenantKey::new(1),
                applied: 0,
                reason: "x".into(),
            },
            ServiceError::Config("x".into()),
            ServiceError::Internal("x".into()),
        ];
        for err in errors {
            assert!(err.code().starts_with("MEMBERDB_"));
            assert!(err.status_code() >= 400);
        }
    }

    #[test]
    fn test_partition_failure_maps_to_transport() {
        let err: ServiceError = QueryError::partition(
            TenantKey::new(4),
            PartitionError::Unavailable("members_ac_4".into()),
        )
        .into();
        assert_eq!(err.code(), "MEMBERDB_PARTITION_TRANSPORT_ERROR");
        assert!(matches!(
            err,
            ServiceError::PartitionTransport {
                tenant: Some(t),
                ..
            } if t == TenantKey::new(4)
        ));
    }

    #[test]
    fn test_tenant_errors_pass_through() {
        let err: ServiceError = QueryError::Tenant(TenantError::UnknownTenant(TenantKey::new(9))).into();
        assert_eq!(err, ServiceError::UnknownTenant(TenantKey::new(9)));
        assert_eq!(err.status_code(), 404);
    }
}
