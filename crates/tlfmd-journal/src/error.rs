use std::path::PathBuf;

use tlfmd_store::StoreError;
use tlfmd_types::Revision;

/// Errors produced by journal operations.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// An append did not directly follow the latest entry.
    #[error("journal consistency violation: expected revision {expected}, got {actual}")]
    Consistency { expected: Revision, actual: Revision },

    /// The journal directory does not describe a contiguous log.
    #[error("corrupt journal at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for journal operations.
pub type JournalResult<T> = Result<T, JournalError>;
