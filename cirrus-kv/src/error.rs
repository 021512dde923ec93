//! Store error types.

use thiserror::Error;

/// Errors that can occur during store and label-index operations.
#[derive(Debug, Error)]
pub enum KvError {
    /// Underlying database failure.
    #[error("storage: {0}")]
    Storage(#[from] sqlx::Error),

    /// A persisted value could not be encoded or decoded.
    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),

    /// A label selector could not be parsed.
    #[error("selector parse error: {0}")]
    SelectorParse(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, KvError>;
