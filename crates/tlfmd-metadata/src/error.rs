use tlfmd_crypto::{HasherError, SignatureError};
use tlfmd_types::{BranchId, MdId, MergeStatus, MetadataVer, Revision, TlfId, UserId};

/// Errors from decoding or validating metadata.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid revision {0}")]
    InvalidRevision(Revision),

    #[error("{status} metadata has branch id {branch}")]
    BranchMismatch { status: MergeStatus, branch: BranchId },

    #[error("writer bundle id is empty ({writer_empty}) != reader bundle id is empty ({reader_empty})")]
    HalfEmptyBundleIds { writer_empty: bool, reader_empty: bool },

    #[error("metadata references key bundles but none were supplied")]
    MissingKeyBundles,

    #[error("key bundles supplied for metadata that references none")]
    UnexpectedKeyBundles,

    #[error("metadata version {0} cannot reference key bundles")]
    BundlesNotSupported(MetadataVer),

    #[error("expected {kind} bundle id {expected}, got {actual}")]
    BundleIdMismatch {
        kind: &'static str,
        expected: String,
        actual: String,
    },

    #[error("signature verification failed: {0}")]
    BadSignature(#[from] SignatureError),

    #[error("signing key is not a device key of user {0}")]
    UnknownSigningKey(UserId),

    #[error("last modifying user is {actual}, not {expected}")]
    NotLastModifiedBy { expected: UserId, actual: UserId },

    #[error("last modifying writer is {actual}, not {expected}")]
    NotLastModifyingWriter { expected: UserId, actual: UserId },

    #[error("metadata was signed by a different key than the caller's")]
    SigningKeyMismatch,

    #[error("metadata belongs to folder {actual}, expected {expected}")]
    TlfMismatch { expected: TlfId, actual: TlfId },

    #[error("metadata version {version} is newer than supported {max}")]
    UnsupportedVersion { version: MetadataVer, max: MetadataVer },

    #[error("hash error: {0}")]
    Hash(#[from] HasherError),
}

/// Convenience alias for metadata results.
pub type MetadataResult<T> = Result<T, MetadataError>;

/// Why a revision is not a valid successor of the current head.
///
/// Clients act on the specific kind (a revision or prev-root conflict means
/// someone else wrote first), so these are kept distinct from generic errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    #[error("revision conflict: expected {expected}, got {actual}")]
    Revision { expected: Revision, actual: Revision },

    #[error("previous root conflict: expected {expected}, got {actual}")]
    PrevRoot { expected: MdId, actual: MdId },

    #[error("disk usage conflict: expected {expected}, got {actual}")]
    DiskUsage { expected: u64, actual: u64 },

    #[error("folder conflict: expected {expected}, got {actual}")]
    Tlf { expected: TlfId, actual: TlfId },

    #[error("revision {0} is the last one; no successor can be written")]
    RevisionExhausted(Revision),
}
