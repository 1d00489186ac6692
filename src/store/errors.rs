//! Store error types.

use thiserror::Error;

use crate::game::ValidationError;

/// Store-layer failure. Backend I/O errors abort the current convergence
/// pass and are logged; recovery happens via the next naturally occurring
/// event, not via explicit retry.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Rejected input, surfaced synchronously before any mutation
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Redis backend I/O failure
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A persisted record could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend returned a value outside the persisted schema
    #[error("unexpected stored value: {0}")]
    Data(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
