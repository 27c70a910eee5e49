//! Content-addressed on-disk storage for a single TLF.
//!
//! Two stores live under a folder's root directory:
//!
//! - [`MdObjectStore`] -- signed metadata revisions, wrapped in an
//!   [`MdEnvelope`] and keyed by their [`MdId`](tlfmd_types::MdId) under
//!   `objects/<first 4 hex>/<rest>`
//! - [`KeyBundleStore`] -- writer and reader key bundles under
//!   `keybundles/writer/<id>` and `keybundles/reader/<id>`
//!
//! # Design Rules
//!
//! 1. Files are immutable once written; the same id always names the same
//!    content.
//! 2. Every write goes to a temporary file in the destination directory and
//!    is renamed into place, so readers never observe a partial file.
//! 3. Every read recomputes the content address and rejects a mismatch.
//! 4. The stores take no locks; the caller serializes writers.

pub mod codec;
pub mod error;
pub mod keybundle;
pub mod object;

pub use codec::{write_atomic, Codec, FileCodec};
pub use error::{StoreError, StoreResult};
pub use keybundle::KeyBundleStore;
pub use object::{MdEnvelope, MdObjectStore};
