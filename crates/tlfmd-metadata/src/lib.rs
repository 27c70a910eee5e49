//! Signed metadata revisions for a TLF.
//!
//! This crate defines what the storage engine stores and how it decides
//! whether a write is acceptable:
//!
//! - [`RootMetadata`]: one revision of a folder's metadata, with the typed
//!   accessors the storage engine relies on (revision, branch, merge status,
//!   key-bundle ids)
//! - [`SignedMetadata`]: a revision plus the signature of its last modifier
//! - [`WriterKeyBundle`] / [`ReaderKeyBundle`] / [`ExtraMetadata`]: the
//!   separately stored key-distribution bundles
//! - [`CryptoPure`]: content addressing and signature verification
//! - [`AccessPolicy`]: reader/writer/rekey authorization predicates
//!
//! The storage engine never interprets the private data carried by a
//! revision; everything it needs is reachable through these types.

pub mod access;
pub mod bundle;
pub mod crypto;
pub mod error;
pub mod root;
pub mod signed;

pub use access::{AccessPolicy, KeyBundleAccess};
pub use bundle::{DeviceKeys, ExtraMetadata, KeyBundlePair, ReaderKeyBundle, WriterKeyBundle};
pub use crypto::{Blake3Crypto, CryptoPure};
pub use error::{ConflictError, MetadataError, MetadataResult};
pub use root::{MetadataFlags, RootMetadata, WriterMetadata};
pub use signed::{SignatureInfo, SignedMetadata};
