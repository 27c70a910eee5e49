use tlfmd_crypto::{ContentHasher, Signature, VerifyingKey};
use tlfmd_types::{MdId, ReaderBundleId, WriterBundleId};

use crate::bundle::{ReaderKeyBundle, WriterKeyBundle};
use crate::error::MetadataResult;
use crate::root::RootMetadata;

/// Pure, deterministic crypto operations used by the storage engine.
pub trait CryptoPure: Send + Sync {
    /// Content address of a metadata payload.
    fn make_md_id(&self, md: &RootMetadata) -> MetadataResult<MdId>;

    /// Content address of a writer key bundle.
    fn make_writer_bundle_id(&self, wkb: &WriterKeyBundle) -> MetadataResult<WriterBundleId>;

    /// Content address of a reader key bundle.
    fn make_reader_bundle_id(&self, rkb: &ReaderKeyBundle) -> MetadataResult<ReaderBundleId>;

    /// Verify a signature over a message.
    fn verify(&self, key: &VerifyingKey, message: &[u8], signature: &Signature)
        -> MetadataResult<()>;
}

/// Domain-separated BLAKE3 addressing and Ed25519 verification.
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake3Crypto;

impl CryptoPure for Blake3Crypto {
    fn make_md_id(&self, md: &RootMetadata) -> MetadataResult<MdId> {
        Ok(MdId::from_hash(ContentHasher::METADATA.hash(&md.canonical_bytes()?)))
    }

    fn make_writer_bundle_id(&self, wkb: &WriterKeyBundle) -> MetadataResult<WriterBundleId> {
        Ok(WriterBundleId::from_hash(
            ContentHasher::WRITER_BUNDLE.hash_canonical(wkb)?,
        ))
    }

    fn make_reader_bundle_id(&self, rkb: &ReaderKeyBundle) -> MetadataResult<ReaderBundleId> {
        Ok(ReaderBundleId::from_hash(
            ContentHasher::READER_BUNDLE.hash_canonical(rkb)?,
        ))
    }

    fn verify(
        &self,
        key: &VerifyingKey,
        message: &[u8],
        signature: &Signature,
    ) -> MetadataResult<()> {
        key.verify(message, signature)?;
        Ok(())
    }
}
