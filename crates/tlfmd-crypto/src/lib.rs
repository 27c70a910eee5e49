//! Hashing and signatures for TLF metadata storage.
//!
//! [`ContentHasher`] derives the content address of every stored object.
//! Device keys ([`SigningKey`], [`VerifyingKey`]) sign and check metadata
//! revisions.

pub mod hasher;
pub mod signer;

pub use hasher::{ContentHasher, HasherError};
pub use signer::{Signature, SignatureError, SigningKey, VerifyingKey};
