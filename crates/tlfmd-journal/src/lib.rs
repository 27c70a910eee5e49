//! Per-branch revision journals.
//!
//! A [`BranchJournal`] maps a contiguous run of revisions to the ids of the
//! metadata objects stored at them. On disk it is a directory:
//!
//! ```text
//! EARLIEST            first revision, 16 hex digits
//! LATEST              last revision, 16 hex digits
//! 0000000000000001    one entry file per revision
//! 0000000000000002
//! ```
//!
//! Appends must extend the journal by exactly one revision; anything else
//! is a [`JournalError::Consistency`] and leaves the journal untouched.

pub mod error;
pub mod journal;

pub use error::{JournalError, JournalResult};
pub use journal::{BranchJournal, JournalEntry};
