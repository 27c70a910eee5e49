use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("unknown hash type: {0:#04x}")]
    UnknownHashType(u8),

    #[error("unknown metadata version: {0}")]
    UnknownMetadataVersion(u32),
}
