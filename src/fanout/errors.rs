//! Query errors

use thiserror::Error;

use crate::partition::PartitionError;
use crate::tenant::{TenantError, TenantKey};

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Tenant could not be resolved
    #[error(transparent)]
    Tenant(#[from] TenantError),

    /// A partition failed; for fan-out calls the whole call was abandoned
    #[error("partition of tenant {tenant} failed: {source}")]
    Partition {
        tenant: TenantKey,
        #[source]
        source: PartitionError,
    },
}

impl QueryError {
    pub fn partition(tenant: TenantKey, source: PartitionError) -> Self {
        Self::Partition { tenant, source }
    }

    /// Tenant whose partition failed, if any
    pub fn failed_tenant(&self) -> Option<TenantKey> {
        match self {
            Self::Partition { tenant, .. } => Some(*tenant),
            Self::Tenant(TenantError::Partition { tenant, .. }) => Some(*tenant),
            Self::Tenant(_) => None,
        }
    }
}
