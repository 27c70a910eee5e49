use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tlfmd_crypto::VerifyingKey;
use tlfmd_types::{MetadataVer, ReaderBundleId, UserId, WriterBundleId};

use crate::crypto::CryptoPure;
use crate::error::{MetadataError, MetadataResult};

/// Per-user device keys.
pub type DeviceKeys = BTreeMap<UserId, BTreeSet<VerifyingKey>>;

/// Keys of every user allowed to write the folder at a point in time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterKeyBundle {
    pub keys: DeviceKeys,
    pub ephemeral_public_keys: Vec<[u8; 32]>,
}

/// Keys of users who may read, but not write, the folder.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderKeyBundle {
    pub keys: DeviceKeys,
    pub ephemeral_public_keys: Vec<[u8; 32]>,
}

impl WriterKeyBundle {
    /// Add a device key for a writer.
    pub fn with_device(mut self, user: UserId, key: VerifyingKey) -> Self {
        self.keys.entry(user).or_default().insert(key);
        self
    }

    pub fn contains(&self, user: &UserId) -> bool {
        self.keys.contains_key(user)
    }

    pub fn has_device(&self, user: &UserId, key: &VerifyingKey) -> bool {
        self.keys.get(user).is_some_and(|keys| keys.contains(key))
    }
}

impl ReaderKeyBundle {
    /// Add a device key for a reader.
    pub fn with_device(mut self, user: UserId, key: VerifyingKey) -> Self {
        self.keys.entry(user).or_default().insert(key);
        self
    }

    pub fn contains(&self, user: &UserId) -> bool {
        self.keys.contains_key(user)
    }

    pub fn has_device(&self, user: &UserId, key: &VerifyingKey) -> bool {
        self.keys.get(user).is_some_and(|keys| keys.contains(key))
    }
}

/// The writer and reader halves of a folder's key-distribution bundle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBundlePair {
    pub writer: WriterKeyBundle,
    pub reader: ReaderKeyBundle,
}

impl KeyBundlePair {
    pub fn new(writer: WriterKeyBundle, reader: ReaderKeyBundle) -> Self {
        Self { writer, reader }
    }

    /// Compute both content addresses.
    pub fn ids(&self, crypto: &dyn CryptoPure) -> MetadataResult<(WriterBundleId, ReaderBundleId)> {
        Ok((
            crypto.make_writer_bundle_id(&self.writer)?,
            crypto.make_reader_bundle_id(&self.reader)?,
        ))
    }

    /// Check that the bundles hash to the stated ids.
    pub fn check_ids(
        &self,
        crypto: &dyn CryptoPure,
        writer_id: &WriterBundleId,
        reader_id: &ReaderBundleId,
    ) -> MetadataResult<()> {
        let (computed_writer, computed_reader) = self.ids(crypto)?;
        if computed_writer != *writer_id {
            return Err(MetadataError::BundleIdMismatch {
                kind: "writer",
                expected: writer_id.to_hex(),
                actual: computed_writer.to_hex(),
            });
        }
        if computed_reader != *reader_id {
            return Err(MetadataError::BundleIdMismatch {
                kind: "reader",
                expected: reader_id.to_hex(),
                actual: computed_reader.to_hex(),
            });
        }
        Ok(())
    }

    /// Whether the user holds the given device key in either bundle.
    pub fn has_device(&self, user: &UserId, key: &VerifyingKey) -> bool {
        self.writer.has_device(user, key) || self.reader.has_device(user, key)
    }
}

/// Key material stored alongside a revision, tagged by bundle format.
///
/// Each supported bundle format is one variant; adding a format means adding
/// a variant and handling it everywhere it is matched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtraMetadata {
    /// Separately stored writer/reader bundles.
    V3(KeyBundlePair),
}

impl ExtraMetadata {
    /// The metadata version this bundle format belongs to.
    pub fn metadata_ver(&self) -> MetadataVer {
        match self {
            Self::V3(_) => MetadataVer::SegregatedKeyBundles,
        }
    }

    pub fn bundles(&self) -> &KeyBundlePair {
        match self {
            Self::V3(pair) => pair,
        }
    }

    pub fn into_bundles(self) -> KeyBundlePair {
        match self {
            Self::V3(pair) => pair,
        }
    }
}

impl From<KeyBundlePair> for ExtraMetadata {
    fn from(pair: KeyBundlePair) -> Self {
        Self::V3(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Blake3Crypto;
    use tlfmd_crypto::SigningKey;

    fn pair() -> (KeyBundlePair, UserId, VerifyingKey) {
        let alice = UserId::derive("alice");
        let key = SigningKey::generate().verifying_key();
        let pair = KeyBundlePair::new(
            WriterKeyBundle::default().with_device(alice, key.clone()),
            ReaderKeyBundle::default(),
        );
        (pair, alice, key)
    }

    #[test]
    fn membership() {
        let (pair, alice, key) = pair();
        assert!(pair.writer.contains(&alice));
        assert!(!pair.reader.contains(&alice));
        assert!(pair.has_device(&alice, &key));
        assert!(!pair.has_device(&UserId::derive("bob"), &key));
    }

    #[test]
    fn check_ids_accepts_computed_ids() {
        let (pair, _, _) = pair();
        let (w, r) = pair.ids(&Blake3Crypto).unwrap();
        pair.check_ids(&Blake3Crypto, &w, &r).unwrap();
    }

    #[test]
    fn check_ids_rejects_swapped_content() {
        let (pair, alice, key) = pair();
        let (w, r) = pair.ids(&Blake3Crypto).unwrap();
        let mut tampered = pair.clone();
        tampered.reader = ReaderKeyBundle::default().with_device(alice, key);
        let err = tampered.check_ids(&Blake3Crypto, &w, &r).unwrap_err();
        assert!(matches!(err, MetadataError::BundleIdMismatch { kind: "reader", .. }));
    }

    #[test]
    fn extra_metadata_version() {
        let (pair, _, _) = pair();
        let extra = ExtraMetadata::from(pair.clone());
        assert_eq!(extra.metadata_ver(), MetadataVer::SegregatedKeyBundles);
        assert_eq!(extra.bundles(), &pair);
    }
}
