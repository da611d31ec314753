//! History error types

use crate::store::StoreError;
use thiserror::Error;

/// Errors surfaced by the history layer
#[derive(Error, Debug)]
pub enum HistoryError {
    /// No session could be opened; nothing was attempted
    #[error("History store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// A mutation or commit failed after the session was open
    #[error("{context}: {source}")]
    PersistenceFailure {
        context: String,
        #[source]
        source: StoreError,
    },

    /// Every generated entry name was already taken
    #[error("No free entry name under {bucket} after {attempts} attempts")]
    NameCollision { bucket: String, attempts: usize },

    /// A read against the store failed
    #[error("Store read failed: {0}")]
    Store(#[from] StoreError),

    /// Caller supplied something unusable
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl HistoryError {
    pub(crate) fn persistence(context: impl Into<String>, source: StoreError) -> Self {
        HistoryError::PersistenceFailure {
            context: context.into(),
            source,
        }
    }
}

/// Result type alias for history operations
pub type HistoryResult<T> = Result<T, HistoryError>;
