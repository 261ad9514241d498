//! Field registry errors

use thiserror::Error;

use crate::fanout::QueryError;
use crate::partition::PartitionError;
use crate::tenant::TenantKey;

/// Result type for metadata store operations
pub type MetadataResult<T> = Result<T, MetadataError>;

/// Result type for schema-evolution operations
pub type FieldResult<T> = Result<T, FieldError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    /// Uniqueness violation on the field name
    #[error("field descriptor '{0}' already exists")]
    DuplicateKey(String),

    #[error("field descriptor '{0}' not found")]
    NotFound(String),

    /// Metadata backend unreachable
    #[error("metadata store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("invalid field name '{0}'")]
    InvalidFieldName(String),

    #[error("field '{0}' already exists")]
    DuplicateField(String),

    #[error("field '{0}' is protected")]
    CriticalFieldProtected(String),

    /// Neither a descriptor nor any document carries the field
    #[error("field '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Query(#[from] QueryError),

    /// A partition failed part-way through a multi-partition mutation.
    /// `applied` documents were already committed and stay committed.
    #[error("interrupted at tenant {tenant} after {applied} documents: {source}")]
    Interrupted {
        tenant: TenantKey,
        applied: u64,
        #[source]
        source: PartitionError,
    },
}

impl FieldError {
    /// Documents committed before the failure
    pub fn applied(&self) -> u64 {
        match self {
            Self::Interrupted { applied, .. } => *applied,
            _ => 0,
        }
    }
}
