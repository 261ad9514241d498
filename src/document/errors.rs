//! Document decoding errors

use thiserror::Error;

/// Result type for document decoding
pub type DocumentResult<T> = Result<T, DocumentError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("document must be an object, got {0}")]
    NotAnObject(String),

    #[error("document is missing '_id'")]
    MissingId,

    #[error("document '_id' must be a string or number, got {0}")]
    InvalidId(String),
}
