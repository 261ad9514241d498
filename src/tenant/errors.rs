//! Tenant resolution errors

use thiserror::Error;

use super::key::TenantKey;
use crate::partition::PartitionError;

/// Result type for tenant resolution
pub type TenantResult<T> = Result<T, TenantError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TenantError {
    /// Key outside the configured tenant set
    #[error("unknown tenant {0}")]
    UnknownTenant(TenantKey),

    /// Alias matched no partition
    #[error("no tenant matches '{0}'")]
    AmbiguousOrUnknownTenant(String),

    /// Registry configuration rejected
    #[error("invalid tenant configuration: {0}")]
    InvalidConfig(String),

    /// A partition failed while an alias was being resolved
    #[error("tenant {tenant}: {source}")]
    Partition {
        tenant: TenantKey,
        #[source]
        source: PartitionError,
    },
}
