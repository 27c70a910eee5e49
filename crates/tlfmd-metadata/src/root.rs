use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tlfmd_types::{
    BranchId, MdId, MergeStatus, MetadataVer, ReaderBundleId, Revision, TlfId, UserId,
    WriterBundleId,
};

use crate::error::{ConflictError, MetadataError, MetadataResult};

/// The part of a revision only writers may change.
///
/// A reader performing a rekey must copy this section verbatim from the
/// previous revision.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterMetadata {
    /// Encrypted folder data; opaque to the storage engine.
    pub serialized_private_data: Vec<u8>,
    pub last_modifying_writer: UserId,
    pub writer_bundle_id: WriterBundleId,
    /// Writers of a public folder (one without key bundles).
    pub public_writers: BTreeSet<UserId>,
    pub disk_usage: u64,
    pub ref_bytes: u64,
    pub unref_bytes: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFlags {
    /// A rekey is requested or in progress.
    pub rekey: bool,
    /// The writer section was copied unchanged from the previous revision.
    pub writer_metadata_copied: bool,
}

/// One revision of a folder's metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootMetadata {
    pub tlf_id: TlfId,
    pub revision: Revision,
    pub prev_root: MdId,
    pub branch_id: BranchId,
    pub merge_status: MergeStatus,
    pub version: MetadataVer,
    pub writer: WriterMetadata,
    pub reader_bundle_id: ReaderBundleId,
    pub last_modifying_user: UserId,
    pub key_generation: u32,
    pub flags: MetadataFlags,
}

impl RootMetadata {
    /// The first merged revision of a public folder, written by `creator`.
    pub fn new_initial(tlf_id: TlfId, creator: UserId) -> Self {
        Self {
            tlf_id,
            revision: Revision::INITIAL,
            prev_root: MdId::EMPTY,
            branch_id: BranchId::NULL,
            merge_status: MergeStatus::Merged,
            version: MetadataVer::SegregatedKeyBundles,
            writer: WriterMetadata {
                last_modifying_writer: creator,
                public_writers: BTreeSet::from([creator]),
                ..WriterMetadata::default()
            },
            reader_bundle_id: ReaderBundleId::EMPTY,
            last_modifying_user: creator,
            key_generation: 0,
            flags: MetadataFlags::default(),
        }
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn bid(&self) -> BranchId {
        self.branch_id
    }

    pub fn merge_status(&self) -> MergeStatus {
        self.merge_status
    }

    pub fn writer_bundle_id(&self) -> WriterBundleId {
        self.writer.writer_bundle_id
    }

    pub fn reader_bundle_id(&self) -> ReaderBundleId {
        self.reader_bundle_id
    }

    /// A folder without key bundles is public: anyone may read it.
    pub fn is_public(&self) -> bool {
        self.writer.writer_bundle_id.is_empty() && self.reader_bundle_id.is_empty()
    }

    /// Canonical encoding, the input to content addressing and signing.
    pub fn canonical_bytes(&self) -> MetadataResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| MetadataError::Serialization(e.to_string()))
    }

    /// Start the next revision on top of this one.
    ///
    /// Per-revision fields (byte deltas, flags) are reset; everything else,
    /// including the branch, carries over.
    pub fn make_successor(&self, current_id: MdId) -> Self {
        let mut next = self.clone();
        next.revision = self.revision.next();
        next.prev_root = current_id;
        next.writer.ref_bytes = 0;
        next.writer.unref_bytes = 0;
        next.flags = MetadataFlags::default();
        next
    }

    /// Move this revision onto an unmerged branch.
    pub fn set_unmerged(&mut self, branch: BranchId) {
        self.branch_id = branch;
        self.merge_status = MergeStatus::Unmerged;
    }

    /// Check that `next` may directly follow this revision, whose id is
    /// `current_id`, from the server's point of view.
    pub fn check_valid_successor_for_server(
        &self,
        current_id: MdId,
        next: &RootMetadata,
    ) -> Result<(), ConflictError> {
        if next.tlf_id != self.tlf_id {
            return Err(ConflictError::Tlf {
                expected: self.tlf_id,
                actual: next.tlf_id,
            });
        }

        let expected_revision = self
            .revision
            .checked_next()
            .ok_or(ConflictError::RevisionExhausted(self.revision))?;
        if next.revision != expected_revision {
            return Err(ConflictError::Revision {
                expected: expected_revision,
                actual: next.revision,
            });
        }

        if next.prev_root != current_id {
            return Err(ConflictError::PrevRoot {
                expected: current_id,
                actual: next.prev_root,
            });
        }

        let mut expected_usage = self.writer.disk_usage;
        if !next.flags.writer_metadata_copied {
            expected_usage = expected_usage
                .saturating_add(next.writer.ref_bytes)
                .saturating_sub(next.writer.unref_bytes);
        }
        if next.writer.disk_usage != expected_usage {
            return Err(ConflictError::DiskUsage {
                expected: expected_usage,
                actual: next.writer.disk_usage,
            });
        }

        Ok(())
    }
}
