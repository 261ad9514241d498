//! Partition access errors
//!
//! Every variant except `InvalidQuery` is a transport-level failure: the
//! partition could not serve the request and the caller cannot tell how
//! much of the population it would have returned.

use thiserror::Error;

use crate::document::DocumentId;

/// Result type for partition operations
pub type PartitionResult<T> = Result<T, PartitionError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartitionError {
    /// Partition is not reachable
    #[error("partition '{0}' is unavailable")]
    Unavailable(String),

    /// Request failed in transit or in the backend
    #[error("partition '{partition}' transport failure: {reason}")]
    Transport { partition: String, reason: String },

    /// Ordered bulk write stopped part-way; earlier writes stay committed
    #[error("partition '{partition}' write interrupted after {applied} writes: {reason}")]
    WriteInterrupted {
        partition: String,
        applied: u64,
        reason: String,
    },

    /// Insert collided with an existing id
    #[error("duplicate document id '{0}'")]
    DuplicateId(DocumentId),

    /// Filter, sort or pipeline could not be interpreted
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl PartitionError {
    pub fn transport(partition: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            partition: partition.into(),
            reason: reason.into(),
        }
    }

    /// True for failures of the partition itself rather than of the request
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Transport { .. } | Self::WriteInterrupted { .. }
        )
    }

    /// Writes committed before the failure, for interrupted bulk writes
    pub fn applied_writes(&self) -> u64 {
        match self {
            Self::WriteInterrupted { applied, .. } => *applied,
            _ => 0,
        }
    }
}
