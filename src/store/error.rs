//! Resource store error types
//!
//! Defines all errors that can occur in the hierarchical store layer.

use thiserror::Error;

/// Errors that can occur in a resource store
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Node does not exist (or vanished since it was resolved)
    #[error("Node not found: {0}")]
    NotFound(String),

    /// A node with the same name already exists under the parent
    #[error("Node already exists: {0}")]
    AlreadyExists(String),

    /// Malformed path or node name
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Session could not be opened
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
