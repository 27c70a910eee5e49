//! Foundation types for TLF metadata storage.
//!
//! This crate provides the identity, ordering, and time types shared by every
//! other `tlfmd` crate.
//!
//! # Key Types
//!
//! - [`ContentHash`]: hash-type byte plus a 32-byte digest, the basis of all
//!   content addresses
//! - [`MdId`], [`WriterBundleId`], [`ReaderBundleId`]: content addresses of
//!   metadata objects and key bundles
//! - [`TlfId`]: identity of the top-level folder being served
//! - [`BranchId`]: identity of a revision history fork ([`BranchId::NULL`]
//!   is the merged history)
//! - [`UserId`]: identity of a caller
//! - [`Revision`]: position in a branch's history
//! - [`Clock`]: time source for storage timestamps

pub mod clock;
pub mod error;
pub mod hash;
pub mod ids;
pub mod revision;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::TypeError;
pub use hash::{ContentHash, HashType};
pub use ids::{BranchId, MdId, ReaderBundleId, TlfId, UserId, WriterBundleId};
pub use revision::{MergeStatus, MetadataVer, Revision};
