use std::fmt;

use thiserror::Error;
use tlfmd_journal::JournalError;
use tlfmd_metadata::{ConflictError, MetadataError};
use tlfmd_store::StoreError;
use tlfmd_types::{BranchId, Revision, UserId};

/// Errors returned by [`TlfStorage`](crate::TlfStorage).
#[derive(Debug, Error)]
pub enum MdServerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller lacks reader or writer capability on the folder.
    #[error("{user} is not allowed to {action} this folder")]
    Unauthorized { user: UserId, action: &'static str },

    /// The caller supplied malformed, badly signed, or misattributed
    /// metadata.
    #[error("bad request: {reason}")]
    BadRequest { reason: String },

    #[error("storage has been shut down")]
    Shutdown,

    /// The new revision does not extend the branch head.
    #[error("conflict: {0}")]
    Conflict(#[from] ConflictError),

    /// A stored revision disagrees with the journal slot it was found in.
    #[error("journal for branch {branch} holds revision {actual} at slot {expected}")]
    Consistency {
        branch: BranchId,
        expected: Revision,
        actual: Revision,
    },

    /// An unmerged branch could not find the merged revision it forks from.
    #[error("expected one merged revision {revision} to branch from, found {found}")]
    MissingBranchPoint { revision: Revision, found: usize },

    #[error("storage lock poisoned")]
    LockPoisoned,
}

/// Coarse error classes callers branch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// I/O or codec failure; may be transient.
    Storage,
    /// On-disk data violates an invariant; the folder should stop serving.
    Corruption,
    /// Someone else extended the branch first.
    Conflict,
    BadRequest,
    Unauthorized,
    Shutdown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Storage => "storage",
            Self::Corruption => "corruption",
            Self::Conflict => "conflict",
            Self::BadRequest => "bad-request",
            Self::Unauthorized => "unauthorized",
            Self::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

impl MdServerError {
    pub fn bad_request(reason: impl fmt::Display) -> Self {
        Self::BadRequest {
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(e) if e.is_integrity() => ErrorKind::Corruption,
            Self::Store(StoreError::MalformedRequest(_)) => ErrorKind::BadRequest,
            Self::Journal(JournalError::Consistency { .. } | JournalError::Corrupt { .. }) => {
                ErrorKind::Corruption
            }
            Self::Consistency { .. } => ErrorKind::Corruption,
            Self::Store(_)
            | Self::Journal(_)
            | Self::Metadata(_)
            | Self::Io(_)
            | Self::MissingBranchPoint { .. }
            | Self::LockPoisoned => ErrorKind::Storage,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::BadRequest { .. } => ErrorKind::BadRequest,
            Self::Shutdown => ErrorKind::Shutdown,
            Self::Conflict(_) => ErrorKind::Conflict,
        }
    }

    /// Whether retrying the same call unchanged might succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Storage
    }
}

/// Result alias for storage coordinator operations.
pub type MdServerResult<T> = Result<T, MdServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(MdServerError::Shutdown.kind(), ErrorKind::Shutdown);
        assert_eq!(MdServerError::bad_request("x").kind(), ErrorKind::BadRequest);
        assert_eq!(
            MdServerError::Unauthorized {
                user: UserId::derive("bob"),
                action: "read"
            }
            .kind(),
            ErrorKind::Unauthorized
        );
        assert_eq!(
            MdServerError::Conflict(ConflictError::Revision {
                expected: Revision::new(2),
                actual: Revision::new(3)
            })
            .kind(),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn integrity_failures_are_corruption() {
        let e = MdServerError::from(StoreError::HashMismatch {
            kind: "metadata",
            expected: "a".into(),
            computed: "b".into(),
        });
        assert_eq!(e.kind(), ErrorKind::Corruption);
        assert!(!e.is_retryable());

        let e = MdServerError::from(JournalError::Consistency {
            expected: Revision::new(3),
            actual: Revision::new(5),
        });
        assert_eq!(e.kind(), ErrorKind::Corruption);
    }

    #[test]
    fn malformed_bundle_request_is_callers_fault() {
        let e = MdServerError::from(StoreError::MalformedRequest("half-empty ids".into()));
        assert_eq!(e.kind(), ErrorKind::BadRequest);
        assert!(!e.is_retryable());
    }

    #[test]
    fn io_is_retryable() {
        let e = MdServerError::from(StoreError::Io(std::io::Error::other("disk")));
        assert_eq!(e.kind(), ErrorKind::Storage);
        assert!(e.is_retryable());
    }

    #[test]
    fn kind_display() {
        assert_eq!(ErrorKind::BadRequest.to_string(), "bad-request");
    }
}
