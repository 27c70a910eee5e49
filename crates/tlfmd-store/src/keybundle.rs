use std::path::{Path, PathBuf};
use std::sync::Arc;

use tlfmd_metadata::{CryptoPure, ExtraMetadata, KeyBundlePair, ReaderKeyBundle, WriterKeyBundle};
use tlfmd_types::{ReaderBundleId, WriterBundleId};
use tracing::{debug, warn};

use crate::codec::FileCodec;
use crate::error::{StoreError, StoreResult};

/// Writer and reader key bundles, each keyed by its own content address.
pub struct KeyBundleStore {
    dir: PathBuf,
    codec: FileCodec,
    crypto: Arc<dyn CryptoPure>,
}

impl KeyBundleStore {
    /// A store rooted at `dir` (normally `<root>/keybundles`).
    pub fn new(dir: impl Into<PathBuf>, crypto: Arc<dyn CryptoPure>) -> Self {
        Self {
            dir: dir.into(),
            codec: FileCodec::default(),
            crypto,
        }
    }

    pub fn with_codec(mut self, codec: FileCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn writer_path(&self, id: &WriterBundleId) -> PathBuf {
        self.dir.join("writer").join(id.to_hex())
    }

    pub fn reader_path(&self, id: &ReaderBundleId) -> PathBuf {
        self.dir.join("reader").join(id.to_hex())
    }

    /// Fetch the bundle pair a revision refers to.
    ///
    /// Returns `Ok(None)` when both ids are empty (the revision references no
    /// bundles) and an error when only one of them is.
    pub fn get_pair(
        &self,
        wkb_id: &WriterBundleId,
        rkb_id: &ReaderBundleId,
    ) -> StoreResult<Option<ExtraMetadata>> {
        match (wkb_id.is_empty(), rkb_id.is_empty()) {
            (true, true) => return Ok(None),
            (false, false) => {}
            (writer_empty, _) => {
                return Err(StoreError::MalformedRequest(format!(
                    "only the {} bundle id is empty",
                    if writer_empty { "writer" } else { "reader" }
                )))
            }
        }

        let writer: WriterKeyBundle = self.read(&self.writer_path(wkb_id), "writer bundle")?;
        let computed = self.crypto.make_writer_bundle_id(&writer)?;
        if computed != *wkb_id {
            warn!(expected = %wkb_id, %computed, "writer bundle hash mismatch");
            return Err(StoreError::HashMismatch {
                kind: "writer bundle",
                expected: wkb_id.to_hex(),
                computed: computed.to_hex(),
            });
        }

        let reader: ReaderKeyBundle = self.read(&self.reader_path(rkb_id), "reader bundle")?;
        let computed = self.crypto.make_reader_bundle_id(&reader)?;
        if computed != *rkb_id {
            warn!(expected = %rkb_id, %computed, "reader bundle hash mismatch");
            return Err(StoreError::HashMismatch {
                kind: "reader bundle",
                expected: rkb_id.to_hex(),
                computed: computed.to_hex(),
            });
        }

        Ok(Some(ExtraMetadata::V3(KeyBundlePair::new(writer, reader))))
    }

    /// Store both halves of `extra` under the given ids.
    ///
    /// The ids must be non-empty and must be the bundles' content addresses.
    /// Rewriting an already stored bundle replaces it with identical bytes.
    pub fn put_pair(
        &self,
        wkb_id: &WriterBundleId,
        rkb_id: &ReaderBundleId,
        extra: &ExtraMetadata,
    ) -> StoreResult<()> {
        if wkb_id.is_empty() || rkb_id.is_empty() {
            return Err(StoreError::InvariantViolation(format!(
                "storing key bundles under an empty id (writer {wkb_id}, reader {rkb_id})"
            )));
        }

        let pair = extra.bundles();
        let (computed_w, computed_r) = pair.ids(self.crypto.as_ref())?;
        if computed_w != *wkb_id {
            return Err(StoreError::HashMismatch {
                kind: "writer bundle",
                expected: wkb_id.to_hex(),
                computed: computed_w.to_hex(),
            });
        }
        if computed_r != *rkb_id {
            return Err(StoreError::HashMismatch {
                kind: "reader bundle",
                expected: rkb_id.to_hex(),
                computed: computed_r.to_hex(),
            });
        }

        self.codec
            .serialize_to_file(&pair.writer, &self.writer_path(wkb_id))?;
        self.codec
            .serialize_to_file(&pair.reader, &self.reader_path(rkb_id))?;
        debug!(writer = %wkb_id, reader = %rkb_id, "stored key bundle pair");
        Ok(())
    }

    fn read<T: serde::de::DeserializeOwned>(&self, path: &Path, what: &str) -> StoreResult<T> {
        self.codec.deserialize_from_file(path).map_err(|e| match e {
            StoreError::NotFound(_) => StoreError::NotFound(format!("{what} {}", path.display())),
            other => other,
        })
    }
}

impl std::fmt::Debug for KeyBundleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyBundleStore")
            .field("dir", &self.dir)
            .field("codec", &self.codec)
            .finish()
    }
}
