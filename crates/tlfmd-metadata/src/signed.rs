use serde::{Deserialize, Serialize};
use tlfmd_crypto::{Signature, SigningKey, VerifyingKey};
use tlfmd_types::{MetadataVer, Revision, TlfId, UserId};
use tracing::debug;

use crate::bundle::ExtraMetadata;
use crate::crypto::CryptoPure;
use crate::error::{MetadataError, MetadataResult};
use crate::root::RootMetadata;

/// The key that signed a revision and its signature over the canonical
/// metadata encoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub verifying_key: VerifyingKey,
    pub signature: Signature,
}

/// A metadata revision together with its last modifier's signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMetadata {
    pub md: RootMetadata,
    pub sig: SignatureInfo,
}

impl SignedMetadata {
    /// Sign `md` with `key`.
    pub fn sign(md: RootMetadata, key: &SigningKey) -> MetadataResult<Self> {
        let signature = key.sign(&md.canonical_bytes()?);
        Ok(Self {
            md,
            sig: SignatureInfo {
                verifying_key: key.verifying_key(),
                signature,
            },
        })
    }

    pub fn md(&self) -> &RootMetadata {
        &self.md
    }

    pub fn revision(&self) -> Revision {
        self.md.revision
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.sig.verifying_key
    }

    /// Encode for storage as an object payload.
    pub fn encode(&self) -> MetadataResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| MetadataError::Serialization(e.to_string()))
    }

    /// Decode a stored payload, rejecting revisions of another folder or
    /// of a format newer than `max_version`.
    pub fn decode(bytes: &[u8], expected_tlf: TlfId, max_version: MetadataVer) -> MetadataResult<Self> {
        let rmds: Self =
            bincode::deserialize(bytes).map_err(|e| MetadataError::Serialization(e.to_string()))?;
        if rmds.md.tlf_id != expected_tlf {
            return Err(MetadataError::TlfMismatch {
                expected: expected_tlf,
                actual: rmds.md.tlf_id,
            });
        }
        if rmds.md.version > max_version {
            return Err(MetadataError::UnsupportedVersion {
                version: rmds.md.version,
                max: max_version,
            });
        }
        Ok(rmds)
    }

    /// Check that the revision is well formed, consistent with `extra`, and
    /// correctly signed.
    pub fn is_valid_and_signed(
        &self,
        crypto: &dyn CryptoPure,
        extra: Option<&ExtraMetadata>,
    ) -> MetadataResult<()> {
        let md = &self.md;

        if md.revision < Revision::INITIAL {
            return Err(MetadataError::InvalidRevision(md.revision));
        }

        let merged = md.merge_status == tlfmd_types::MergeStatus::Merged;
        if merged != md.branch_id.is_null() {
            return Err(MetadataError::BranchMismatch {
                status: md.merge_status,
                branch: md.branch_id,
            });
        }

        let writer_empty = md.writer_bundle_id().is_empty();
        let reader_empty = md.reader_bundle_id().is_empty();
        if writer_empty != reader_empty {
            return Err(MetadataError::HalfEmptyBundleIds {
                writer_empty,
                reader_empty,
            });
        }

        let has_ids = !writer_empty;
        if has_ids && !md.version.has_key_bundles() {
            return Err(MetadataError::BundlesNotSupported(md.version));
        }

        let bundles = match (has_ids, extra) {
            (true, Some(extra)) => {
                let pair = extra.bundles();
                pair.check_ids(crypto, &md.writer_bundle_id(), &md.reader_bundle_id())?;
                Some(pair)
            }
            (true, None) => return Err(MetadataError::MissingKeyBundles),
            (false, Some(_)) => return Err(MetadataError::UnexpectedKeyBundles),
            (false, None) => None,
        };

        crypto.verify(
            &self.sig.verifying_key,
            &md.canonical_bytes()?,
            &self.sig.signature,
        )?;

        if let Some(pair) = bundles {
            let key = &self.sig.verifying_key;
            let known = pair.has_device(&md.last_modifying_user, key)
                || pair.has_device(&md.writer.last_modifying_writer, key);
            if !known {
                return Err(MetadataError::UnknownSigningKey(md.last_modifying_user));
            }
        }

        debug!(revision = %md.revision, branch = %md.branch_id, "metadata validated");
        Ok(())
    }

    /// Check that `uid`, signing with `key`, made this revision.
    pub fn is_last_modified_by(&self, uid: UserId, key: &VerifyingKey) -> MetadataResult<()> {
        let md = &self.md;
        if md.last_modifying_user != uid {
            return Err(MetadataError::NotLastModifiedBy {
                expected: uid,
                actual: md.last_modifying_user,
            });
        }
        if self.sig.verifying_key != *key {
            return Err(MetadataError::SigningKeyMismatch);
        }
        if !md.flags.writer_metadata_copied && md.writer.last_modifying_writer != uid {
            return Err(MetadataError::NotLastModifyingWriter {
                expected: uid,
                actual: md.writer.last_modifying_writer,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{KeyBundlePair, ReaderKeyBundle, WriterKeyBundle};
    use crate::crypto::Blake3Crypto;
    use tlfmd_types::{BranchId, MergeStatus};

    struct Fixture {
        alice: UserId,
        key: SigningKey,
        tlf: TlfId,
    }

    fn fixture() -> Fixture {
        Fixture {
            alice: UserId::derive("alice"),
            key: SigningKey::generate(),
            tlf: TlfId::random(),
        }
    }

    fn private_md(f: &Fixture) -> (RootMetadata, ExtraMetadata) {
        let pair = KeyBundlePair::new(
            WriterKeyBundle::default().with_device(f.alice, f.key.verifying_key()),
            ReaderKeyBundle::default(),
        );
        let (w, r) = pair.ids(&Blake3Crypto).unwrap();
        let mut md = RootMetadata::new_initial(f.tlf, f.alice);
        md.writer.public_writers.clear();
        md.writer.writer_bundle_id = w;
        md.reader_bundle_id = r;
        (md, pair.into())
    }

    // ---------------------------------------------------------------
    // Validation
    // ---------------------------------------------------------------

    #[test]
    fn public_initial_revision_is_valid() {
        let f = fixture();
        let rmds = SignedMetadata::sign(RootMetadata::new_initial(f.tlf, f.alice), &f.key).unwrap();
        rmds.is_valid_and_signed(&Blake3Crypto, None).unwrap();
    }

    #[test]
    fn private_revision_needs_its_bundles() {
        let f = fixture();
        let (md, extra) = private_md(&f);
        let rmds = SignedMetadata::sign(md, &f.key).unwrap();
        rmds.is_valid_and_signed(&Blake3Crypto, Some(&extra)).unwrap();
        assert_eq!(
            rmds.is_valid_and_signed(&Blake3Crypto, None),
            Err(MetadataError::MissingKeyBundles)
        );
    }

    #[test]
    fn bundles_for_public_revision_are_rejected() {
        let f = fixture();
        let (_, extra) = private_md(&f);
        let rmds = SignedMetadata::sign(RootMetadata::new_initial(f.tlf, f.alice), &f.key).unwrap();
        assert_eq!(
            rmds.is_valid_and_signed(&Blake3Crypto, Some(&extra)),
            Err(MetadataError::UnexpectedKeyBundles)
        );
    }

    #[test]
    fn half_empty_ids_are_rejected() {
        let f = fixture();
        let (mut md, extra) = private_md(&f);
        md.reader_bundle_id = Default::default();
        let rmds = SignedMetadata::sign(md, &f.key).unwrap();
        assert!(matches!(
            rmds.is_valid_and_signed(&Blake3Crypto, Some(&extra)),
            Err(MetadataError::HalfEmptyBundleIds { .. })
        ));
    }

    #[test]
    fn merged_with_branch_is_rejected() {
        let f = fixture();
        let mut md = RootMetadata::new_initial(f.tlf, f.alice);
        md.branch_id = BranchId::random();
        let rmds = SignedMetadata::sign(md, &f.key).unwrap();
        assert!(matches!(
            rmds.is_valid_and_signed(&Blake3Crypto, None),
            Err(MetadataError::BranchMismatch { .. })
        ));

        let mut md = RootMetadata::new_initial(f.tlf, f.alice);
        md.merge_status = MergeStatus::Unmerged;
        let rmds = SignedMetadata::sign(md, &f.key).unwrap();
        assert!(matches!(
            rmds.is_valid_and_signed(&Blake3Crypto, None),
            Err(MetadataError::BranchMismatch { .. })
        ));
    }

    #[test]
    fn zero_revision_is_rejected() {
        let f = fixture();
        let mut md = RootMetadata::new_initial(f.tlf, f.alice);
        md.revision = Revision::UNINITIALIZED;
        let rmds = SignedMetadata::sign(md, &f.key).unwrap();
        assert_eq!(
            rmds.is_valid_and_signed(&Blake3Crypto, None),
            Err(MetadataError::InvalidRevision(Revision::UNINITIALIZED))
        );
    }

    #[test]
    fn tampered_metadata_fails_signature() {
        let f = fixture();
        let mut rmds =
            SignedMetadata::sign(RootMetadata::new_initial(f.tlf, f.alice), &f.key).unwrap();
        rmds.md.writer.disk_usage = 1;
        assert!(matches!(
            rmds.is_valid_and_signed(&Blake3Crypto, None),
            Err(MetadataError::BadSignature(_))
        ));
    }

    #[test]
    fn signer_must_be_a_known_device() {
        let f = fixture();
        let (md, extra) = private_md(&f);
        let rmds = SignedMetadata::sign(md, &SigningKey::generate()).unwrap();
        assert_eq!(
            rmds.is_valid_and_signed(&Blake3Crypto, Some(&extra)),
            Err(MetadataError::UnknownSigningKey(f.alice))
        );
    }

    #[test]
    fn v2_cannot_reference_bundles() {
        let f = fixture();
        let (mut md, extra) = private_md(&f);
        md.version = MetadataVer::InitialExtra;
        let rmds = SignedMetadata::sign(md, &f.key).unwrap();
        assert_eq!(
            rmds.is_valid_and_signed(&Blake3Crypto, Some(&extra)),
            Err(MetadataError::BundlesNotSupported(MetadataVer::InitialExtra))
        );
    }

    // ---------------------------------------------------------------
    // Attribution
    // ---------------------------------------------------------------

    #[test]
    fn last_modified_by_signer() {
        let f = fixture();
        let rmds = SignedMetadata::sign(RootMetadata::new_initial(f.tlf, f.alice), &f.key).unwrap();
        rmds.is_last_modified_by(f.alice, &f.key.verifying_key()).unwrap();

        let bob = UserId::derive("bob");
        assert!(matches!(
            rmds.is_last_modified_by(bob, &f.key.verifying_key()),
            Err(MetadataError::NotLastModifiedBy { .. })
        ));
        assert_eq!(
            rmds.is_last_modified_by(f.alice, &SigningKey::generate().verifying_key()),
            Err(MetadataError::SigningKeyMismatch)
        );
    }

    #[test]
    fn rekey_by_reader_keeps_writer() {
        let f = fixture();
        let bob = UserId::derive("bob");
        let mut md = RootMetadata::new_initial(f.tlf, f.alice);
        md.last_modifying_user = bob;
        let rmds = SignedMetadata::sign(md.clone(), &f.key).unwrap();
        assert!(matches!(
            rmds.is_last_modified_by(bob, &f.key.verifying_key()),
            Err(MetadataError::NotLastModifyingWriter { .. })
        ));

        md.flags.writer_metadata_copied = true;
        let rmds = SignedMetadata::sign(md, &f.key).unwrap();
        rmds.is_last_modified_by(bob, &f.key.verifying_key()).unwrap();
    }

    // ---------------------------------------------------------------
    // Encoding
    // ---------------------------------------------------------------

    #[test]
    fn decode_checks_folder_and_version() {
        let f = fixture();
        let rmds = SignedMetadata::sign(RootMetadata::new_initial(f.tlf, f.alice), &f.key).unwrap();
        let bytes = rmds.encode().unwrap();

        let decoded = SignedMetadata::decode(&bytes, f.tlf, MetadataVer::SegregatedKeyBundles).unwrap();
        assert_eq!(decoded, rmds);

        assert!(matches!(
            SignedMetadata::decode(&bytes, TlfId::random(), MetadataVer::SegregatedKeyBundles),
            Err(MetadataError::TlfMismatch { .. })
        ));
        assert!(matches!(
            SignedMetadata::decode(&bytes, f.tlf, MetadataVer::InitialExtra),
            Err(MetadataError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            SignedMetadata::decode(b"nope", TlfId::random(), MetadataVer::SegregatedKeyBundles),
            Err(MetadataError::Serialization(_))
        ));
    }
}
