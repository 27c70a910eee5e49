use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tlfmd_metadata::{CryptoPure, SignedMetadata};
use tlfmd_types::{Clock, MdId, MetadataVer, TlfId};
use tracing::{debug, warn};

use crate::codec::FileCodec;
use crate::error::{StoreError, StoreResult};

/// Hex characters of an id used as the splay directory name: the hash type
/// byte plus the first digest byte.
const SPLAY_PREFIX_LEN: usize = 4;

/// The body of an object file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MdEnvelope {
    /// Encoded [`SignedMetadata`].
    pub encoded_rmds: Vec<u8>,
    /// When the server first stored the revision.
    pub timestamp: DateTime<Utc>,
    pub version: MetadataVer,
}

/// Signed metadata revisions, keyed by [`MdId`].
pub struct MdObjectStore {
    dir: PathBuf,
    tlf_id: TlfId,
    max_version: MetadataVer,
    codec: FileCodec,
    crypto: Arc<dyn CryptoPure>,
    clock: Arc<dyn Clock>,
}

impl MdObjectStore {
    /// A store rooted at `dir` (normally `<root>/objects`).
    pub fn new(
        dir: impl Into<PathBuf>,
        tlf_id: TlfId,
        crypto: Arc<dyn CryptoPure>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dir: dir.into(),
            tlf_id,
            max_version: MetadataVer::default(),
            codec: FileCodec::default(),
            crypto,
            clock,
        }
    }

    pub fn with_codec(mut self, codec: FileCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Newest metadata format this store will decode.
    pub fn with_max_version(mut self, max_version: MetadataVer) -> Self {
        self.max_version = max_version;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `id`.
    pub fn path(&self, id: &MdId) -> PathBuf {
        let hex = id.to_hex();
        let (prefix, rest) = hex.split_at(SPLAY_PREFIX_LEN);
        self.dir.join(prefix).join(rest)
    }

    pub fn exists(&self, id: &MdId) -> bool {
        self.path(id).is_file()
    }

    /// Store a revision and return its id.
    ///
    /// A revision whose id is already stored is not rewritten; the existing
    /// file (and its original timestamp) is kept.
    pub fn put(&self, rmds: &SignedMetadata) -> StoreResult<MdId> {
        let id = self.crypto.make_md_id(&rmds.md)?;
        if id.is_empty() {
            return Err(StoreError::InvariantViolation(
                "computed an empty metadata id".into(),
            ));
        }

        let path = self.path(&id);
        if path.is_file() {
            debug!(%id, "metadata object already stored");
            return Ok(id);
        }

        let envelope = MdEnvelope {
            encoded_rmds: rmds.encode()?,
            timestamp: self.clock.now(),
            version: rmds.md.version,
        };
        self.codec.serialize_to_file(&envelope, &path)?;
        debug!(%id, revision = %rmds.md.revision, "stored metadata object");
        Ok(id)
    }

    /// Read and verify the revision stored under `id`.
    pub fn get(&self, id: &MdId) -> StoreResult<SignedMetadata> {
        self.get_envelope(id).map(|(rmds, _)| rmds)
    }

    /// Read and verify the revision stored under `id`, with the time it was
    /// stored.
    pub fn get_envelope(&self, id: &MdId) -> StoreResult<(SignedMetadata, DateTime<Utc>)> {
        let path = self.path(id);
        let envelope: MdEnvelope = self
            .codec
            .deserialize_from_file(&path)
            .map_err(|e| match e {
                StoreError::NotFound(_) => StoreError::NotFound(format!("metadata object {id}")),
                other => other,
            })?;

        let rmds = SignedMetadata::decode(&envelope.encoded_rmds, self.tlf_id, self.max_version)?;
        let computed = self.crypto.make_md_id(&rmds.md)?;
        if computed != *id {
            warn!(expected = %id, %computed, path = %path.display(), "metadata object hash mismatch");
            return Err(StoreError::HashMismatch {
                kind: "metadata",
                expected: id.to_hex(),
                computed: computed.to_hex(),
            });
        }
        Ok((rmds, envelope.timestamp))
    }
}

impl std::fmt::Debug for MdObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MdObjectStore")
            .field("dir", &self.dir)
            .field("tlf_id", &self.tlf_id)
            .field("codec", &self.codec)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tlfmd_crypto::SigningKey;
    use tlfmd_metadata::{Blake3Crypto, RootMetadata};
    use tlfmd_types::{FixedClock, UserId};

    struct Fixture {
        _dir: tempfile::TempDir,
        store: MdObjectStore,
        clock: Arc<FixedClock>,
        tlf: TlfId,
        key: SigningKey,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let tlf = TlfId::random();
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let store = MdObjectStore::new(
            dir.path().join("objects"),
            tlf,
            Arc::new(Blake3Crypto),
            clock.clone(),
        );
        Fixture {
            _dir: dir,
            store,
            clock,
            tlf,
            key: SigningKey::generate(),
        }
    }

    fn signed(f: &Fixture, disk_usage: u64) -> SignedMetadata {
        let mut md = RootMetadata::new_initial(f.tlf, UserId::derive("alice"));
        md.writer.disk_usage = disk_usage;
        SignedMetadata::sign(md, &f.key).unwrap()
    }

    fn file_count(dir: &Path) -> usize {
        if !dir.exists() {
            return 0;
        }
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| std::fs::read_dir(e.unwrap().path()).unwrap().count())
            .sum()
    }

    // ---------------------------------------------------------------
    // Put / get
    // ---------------------------------------------------------------

    #[test]
    fn put_then_get() {
        let f = fixture();
        let rmds = signed(&f, 10);
        let id = f.store.put(&rmds).unwrap();
        assert_eq!(id, Blake3Crypto.make_md_id(&rmds.md).unwrap());
        assert!(f.store.exists(&id));
        assert_eq!(f.store.get(&id).unwrap(), rmds);
    }

    #[test]
    fn path_is_splayed() {
        let f = fixture();
        let id = f.store.put(&signed(&f, 1)).unwrap();
        let hex = id.to_hex();
        let path = f.store.path(&id);
        assert_eq!(path, f.store.dir().join(&hex[..4]).join(&hex[4..]));
        assert!(path.is_file());
        // Hash type byte 01 (blake3) leads every splay directory name.
        assert!(hex.starts_with("01"));
    }

    #[test]
    fn put_is_idempotent() {
        let f = fixture();
        let rmds = signed(&f, 5);
        let first = f.store.put(&rmds).unwrap();
        let (_, stored_at) = f.store.get_envelope(&first).unwrap();

        f.clock.advance(chrono::Duration::seconds(60));
        let second = f.store.put(&rmds).unwrap();
        assert_eq!(first, second);
        assert_eq!(file_count(f.store.dir()), 1);
        // The original timestamp survives the second put.
        assert_eq!(f.store.get_envelope(&second).unwrap().1, stored_at);
    }

    #[test]
    fn missing_object_is_not_found() {
        let f = fixture();
        let id = Blake3Crypto.make_md_id(&signed(&f, 3).md).unwrap();
        assert!(f.store.get(&id).unwrap_err().is_not_found());
    }

    #[test]
    fn tampered_object_fails_integrity() {
        let f = fixture();
        let a = signed(&f, 1);
        let b = signed(&f, 2);
        let id_a = f.store.put(&a).unwrap();

        // Overwrite a's file with b's envelope.
        let envelope = MdEnvelope {
            encoded_rmds: b.encode().unwrap(),
            timestamp: Utc::now(),
            version: b.md.version,
        };
        f.store
            .codec
            .serialize_to_file(&envelope, &f.store.path(&id_a))
            .unwrap();

        let err = f.store.get(&id_a).unwrap_err();
        assert!(err.is_integrity(), "{err}");
    }

    #[test]
    fn other_folder_is_rejected_on_read() {
        let f = fixture();
        let id = f.store.put(&signed(&f, 1)).unwrap();
        let other = MdObjectStore::new(
            f.store.dir().to_path_buf(),
            TlfId::random(),
            Arc::new(Blake3Crypto),
            f.clock.clone(),
        );
        assert!(matches!(other.get(&id), Err(StoreError::Metadata(_))));
    }

    #[test]
    fn json_codec_roundtrip() {
        let mut f = fixture();
        f.store = MdObjectStore::new(
            f.store.dir().to_path_buf(),
            f.tlf,
            Arc::new(Blake3Crypto),
            f.clock.clone(),
        )
        .with_codec(FileCodec::new(crate::Codec::Json));
        let rmds = signed(&f, 4);
        let id = f.store.put(&rmds).unwrap();
        assert_eq!(f.store.get(&id).unwrap(), rmds);
    }

    // ---------------------------------------------------------------
    // Properties
    // ---------------------------------------------------------------

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn get_of_put_is_identity(
            usage in any::<u64>(),
            private in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let f = fixture();
            let mut md = RootMetadata::new_initial(f.tlf, UserId::derive("alice"));
            md.writer.disk_usage = usage;
            md.writer.serialized_private_data = private;
            let rmds = SignedMetadata::sign(md, &f.key).unwrap();

            let id = f.store.put(&rmds).unwrap();
            prop_assert_eq!(id, Blake3Crypto.make_md_id(&rmds.md).unwrap());
            prop_assert_eq!(f.store.get(&id).unwrap(), rmds);
        }
    }
}
