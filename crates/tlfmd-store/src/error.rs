use tlfmd_metadata::MetadataError;

/// Errors from the content-addressed stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Nothing is stored at the derived path.
    #[error("not found: {0}")]
    NotFound(String),

    /// Recomputed content address differs from the requested one
    /// (on-disk corruption or a wrong-address write).
    #[error("hash mismatch for {kind}: expected {expected}, computed {computed}")]
    HashMismatch {
        kind: &'static str,
        expected: String,
        computed: String,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller asked for something that cannot exist, such as only one
    /// half of a key-bundle pair.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// A caller broke a precondition the store relies on.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether the error means stored data can no longer be trusted.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::HashMismatch { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
