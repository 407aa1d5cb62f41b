//! Error types for key-value store operations.

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A compare-and-swap targeted a key that does not exist and
    /// `create_if_missing` was false.
    #[error("key does not exist: {key}")]
    KeyNotFound { key: String },

    /// A compare-and-swap found a value other than the expected one.
    #[error("precondition failed for {key}: expected {expected}, found {actual}")]
    PreconditionFailed {
        key: String,
        expected: serde_json::Value,
        actual: serde_json::Value,
    },

    /// The store could not complete the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl Error {
    /// Whether this is a compare-and-swap mismatch, i.e. another writer won.
    #[must_use]
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, Self::PreconditionFailed { .. })
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;
