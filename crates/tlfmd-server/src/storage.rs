use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tlfmd_crypto::VerifyingKey;
use tlfmd_journal::{BranchJournal, JournalEntry};
use tlfmd_metadata::{
    AccessPolicy, Blake3Crypto, CryptoPure, ExtraMetadata, KeyBundleAccess, MetadataError,
    SignedMetadata,
};
use tlfmd_store::{FileCodec, KeyBundleStore, MdObjectStore};
use tlfmd_types::{
    BranchId, Clock, MdId, MergeStatus, ReaderBundleId, Revision, SystemClock, TlfId, UserId,
    WriterBundleId,
};
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::error::{MdServerError, MdServerResult};
use crate::verify::{BranchReport, VerifyReport, Violation, ViolationKind};

/// Pluggable behavior of a [`TlfStorage`].
#[derive(Clone)]
pub struct Collaborators {
    pub crypto: Arc<dyn CryptoPure>,
    pub access: Arc<dyn AccessPolicy>,
    pub clock: Arc<dyn Clock>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            crypto: Arc::new(Blake3Crypto),
            access: Arc::new(KeyBundleAccess),
            clock: Arc::new(SystemClock),
        }
    }
}

enum Lifecycle {
    Open(HashMap<BranchId, BranchJournal>),
    Shutdown,
}

impl Lifecycle {
    fn journals(&self) -> MdServerResult<&HashMap<BranchId, BranchJournal>> {
        match self {
            Self::Open(journals) => Ok(journals),
            Self::Shutdown => Err(MdServerError::Shutdown),
        }
    }

    fn journals_mut(&mut self) -> MdServerResult<&mut HashMap<BranchId, BranchJournal>> {
        match self {
            Self::Open(journals) => Ok(journals),
            Self::Shutdown => Err(MdServerError::Shutdown),
        }
    }
}

/// The head of a branch: its latest revision and that revision's id.
type Head = (MdId, SignedMetadata);

/// Metadata storage for one TLF.
///
/// Reads (`get_head`, `get_range`) share the lock; `put`, `shutdown` and
/// `get_key_bundles` hold it exclusively. After [`shutdown`](Self::shutdown)
/// every call fails with [`MdServerError::Shutdown`] before touching disk.
pub struct TlfStorage {
    tlf_id: TlfId,
    config: StorageConfig,
    codec: FileCodec,
    crypto: Arc<dyn CryptoPure>,
    access: Arc<dyn AccessPolicy>,
    objects: MdObjectStore,
    bundles: KeyBundleStore,
    state: RwLock<Lifecycle>,
}

impl TlfStorage {
    /// Open storage for `tlf_id` with the default collaborators.
    pub fn open(tlf_id: TlfId, config: StorageConfig) -> MdServerResult<Self> {
        Self::open_with(tlf_id, config, Collaborators::default())
    }

    pub fn open_with(
        tlf_id: TlfId,
        config: StorageConfig,
        collaborators: Collaborators,
    ) -> MdServerResult<Self> {
        fs::create_dir_all(&config.root)?;
        let codec = config.file_codec();
        let Collaborators {
            crypto,
            access,
            clock,
        } = collaborators;

        let objects = MdObjectStore::new(config.objects_dir(), tlf_id, crypto.clone(), clock)
            .with_codec(codec)
            .with_max_version(config.metadata_version);
        let bundles = KeyBundleStore::new(config.keybundles_dir(), crypto.clone()).with_codec(codec);

        info!(tlf = %tlf_id, root = %config.root.display(), codec = ?config.codec, "opened TLF storage");
        Ok(Self {
            tlf_id,
            config,
            codec,
            crypto,
            access,
            objects,
            bundles,
            state: RwLock::new(Lifecycle::Open(HashMap::new())),
        })
    }

    pub fn tlf_id(&self) -> TlfId {
        self.tlf_id
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    fn read_state(&self) -> MdServerResult<RwLockReadGuard<'_, Lifecycle>> {
        self.state.read().map_err(|_| MdServerError::LockPoisoned)
    }

    fn write_state(&self) -> MdServerResult<RwLockWriteGuard<'_, Lifecycle>> {
        self.state.write().map_err(|_| MdServerError::LockPoisoned)
    }

    fn journal_dir(&self, branch: BranchId) -> PathBuf {
        self.config.journals_dir().join(branch.to_hex())
    }

    /// The branch's journal if it is open or exists on disk. Does not cache.
    fn existing_journal(
        &self,
        journals: &HashMap<BranchId, BranchJournal>,
        branch: BranchId,
    ) -> Option<BranchJournal> {
        journals
            .get(&branch)
            .cloned()
            .or_else(|| BranchJournal::open_existing(self.journal_dir(branch), self.codec))
    }

    fn head_of(&self, journal: &BranchJournal) -> MdServerResult<Option<Head>> {
        match journal.latest_entry()? {
            Some((_, entry)) => Ok(Some((entry.id, self.objects.get(&entry.id)?))),
            None => Ok(None),
        }
    }

    fn merged_head(
        &self,
        journals: &HashMap<BranchId, BranchJournal>,
    ) -> MdServerResult<Option<Head>> {
        match self.existing_journal(journals, BranchId::NULL) {
            Some(journal) => self.head_of(&journal),
            None => Ok(None),
        }
    }

    fn bundles_for(&self, rmds: &SignedMetadata) -> MdServerResult<Option<ExtraMetadata>> {
        let md = rmds.md();
        Ok(self
            .bundles
            .get_pair(&md.writer_bundle_id(), &md.reader_bundle_id())?)
    }

    /// Readers of the merged head may read every branch. With no merged
    /// head yet, anyone may.
    fn check_reader(
        &self,
        journals: &HashMap<BranchId, BranchJournal>,
        user: UserId,
    ) -> MdServerResult<()> {
        let Some((_, head)) = self.merged_head(journals)? else {
            return Ok(());
        };
        let extra = self.bundles_for(&head)?;
        if !self.access.is_reader(user, head.md(), extra.as_ref()) {
            debug!(tlf = %self.tlf_id, %user, "read denied");
            return Err(MdServerError::Unauthorized {
                user,
                action: "read",
            });
        }
        Ok(())
    }

    /// The latest revision of `branch`, or `None` if the branch has none.
    pub fn get_head(&self, user: UserId, branch: BranchId) -> MdServerResult<Option<SignedMetadata>> {
        let state = self.read_state()?;
        let journals = state.journals()?;
        self.check_reader(journals, user)?;

        match self.existing_journal(journals, branch) {
            Some(journal) => Ok(self.head_of(&journal)?.map(|(_, rmds)| rmds)),
            None => Ok(None),
        }
    }

    /// Revisions of `branch` in `[start, stop]`, clamped to what exists.
    pub fn get_range(
        &self,
        user: UserId,
        branch: BranchId,
        start: Revision,
        stop: Revision,
    ) -> MdServerResult<Vec<SignedMetadata>> {
        let state = self.read_state()?;
        let journals = state.journals()?;
        self.check_reader(journals, user)?;

        let Some(journal) = self.existing_journal(journals, branch) else {
            return Ok(Vec::new());
        };
        let (real_start, entries) = journal.entry_range(start, stop)?;

        let mut out = Vec::with_capacity(entries.len());
        let slots = (real_start.as_u64()..=u64::MAX).map(Revision::new);
        for (expected, entry) in slots.zip(&entries) {
            let rmds = self.objects.get(&entry.id)?;
            if rmds.revision() != expected {
                warn!(
                    tlf = %self.tlf_id, %branch, %expected, actual = %rmds.revision(),
                    "journal slot holds the wrong revision"
                );
                return Err(MdServerError::Consistency {
                    branch,
                    expected,
                    actual: rmds.revision(),
                });
            }
            out.push(rmds);
        }
        Ok(out)
    }

    /// Append `rmds` to its branch on behalf of `user`, who signed it with
    /// `key`.
    ///
    /// `extra` carries the key bundles the revision refers to; when `None`
    /// they are looked up in storage. Returns `true` when the write created
    /// a new unmerged branch, which the caller should record.
    pub fn put(
        &self,
        user: UserId,
        key: &VerifyingKey,
        rmds: &SignedMetadata,
        extra: Option<ExtraMetadata>,
    ) -> MdServerResult<bool> {
        let mut state = self.write_state()?;
        let journals = state.journals_mut()?;
        let md = rmds.md();

        let extra = match extra {
            Some(extra) => Some(extra),
            None => self.bundles_for(rmds)?,
        };

        // Anything stored here must decode again on the read path.
        if md.tlf_id != self.tlf_id {
            return Err(MdServerError::bad_request(MetadataError::TlfMismatch {
                expected: self.tlf_id,
                actual: md.tlf_id,
            }));
        }
        if md.version > self.config.metadata_version {
            return Err(MdServerError::bad_request(MetadataError::UnsupportedVersion {
                version: md.version,
                max: self.config.metadata_version,
            }));
        }

        rmds.is_valid_and_signed(self.crypto.as_ref(), extra.as_ref())
            .map_err(MdServerError::bad_request)?;
        rmds.is_last_modified_by(user, key)
            .map_err(MdServerError::bad_request)?;

        if let Some((_, merged)) = self.merged_head(journals)? {
            let prev_extra = self.bundles_for(&merged)?;
            let allowed = self.access.is_writer_or_valid_rekey(
                user,
                merged.md(),
                md,
                prev_extra.as_ref(),
                extra.as_ref(),
            );
            if !allowed {
                debug!(tlf = %self.tlf_id, %user, "write denied");
                return Err(MdServerError::Unauthorized {
                    user,
                    action: "write",
                });
            }
        }

        let branch = md.bid();
        let own_head = match self.existing_journal(journals, branch) {
            Some(journal) => self.head_of(&journal)?,
            None => None,
        };
        let (head, record_branch_id) = match (own_head, md.merge_status()) {
            (Some(head), _) => (Some(head), false),
            (None, MergeStatus::Unmerged) => {
                (Some(self.branch_point(journals, md.revision())?), true)
            }
            (None, MergeStatus::Merged) => (None, false),
        };

        if let Some((head_id, head)) = &head {
            head.md()
                .check_valid_successor_for_server(*head_id, md)
                .map_err(|e| {
                    debug!(tlf = %self.tlf_id, %branch, error = %e, "rejected non-successor");
                    MdServerError::Conflict(e)
                })?;
        }

        let id = self.objects.put(rmds)?;
        if let Some(extra) = &extra {
            self.bundles
                .put_pair(&md.writer_bundle_id(), &md.reader_bundle_id(), extra)?;
        }

        let journal = match journals.entry(branch) {
            Entry::Occupied(open) => open.into_mut(),
            Entry::Vacant(slot) => {
                slot.insert(BranchJournal::open(self.journal_dir(branch), self.codec)?)
            }
        };
        journal.append(md.revision(), &JournalEntry::new(id))?;

        if record_branch_id {
            info!(tlf = %self.tlf_id, %branch, revision = %md.revision(), "created unmerged branch");
        }
        debug!(tlf = %self.tlf_id, %branch, revision = %md.revision(), %id, "put metadata");
        Ok(record_branch_id)
    }

    /// The merged revision an unmerged branch starting at `revision` forks
    /// from.
    fn branch_point(
        &self,
        journals: &HashMap<BranchId, BranchJournal>,
        revision: Revision,
    ) -> MdServerResult<Head> {
        let missing = MdServerError::MissingBranchPoint {
            revision: revision.prev().unwrap_or(Revision::UNINITIALIZED),
            found: 0,
        };
        let (Some(prev), Some(merged)) = (
            revision.prev(),
            self.existing_journal(journals, BranchId::NULL),
        ) else {
            return Err(missing);
        };

        let (_, entries) = merged.entry_range(prev, prev)?;
        match entries.as_slice() {
            [entry] => Ok((entry.id, self.objects.get(&entry.id)?)),
            other => Err(MdServerError::MissingBranchPoint {
                revision: prev,
                found: other.len(),
            }),
        }
    }

    /// Fetch a key-bundle pair by id.
    ///
    /// Takes the exclusive lock, serializing with writes.
    pub fn get_key_bundles(
        &self,
        wkb_id: &WriterBundleId,
        rkb_id: &ReaderBundleId,
    ) -> MdServerResult<Option<ExtraMetadata>> {
        let state = self.write_state()?;
        state.journals()?;
        Ok(self.bundles.get_pair(wkb_id, rkb_id)?)
    }

    /// Number of revisions in `branch`'s journal.
    pub fn journal_length(&self, branch: BranchId) -> MdServerResult<u64> {
        let state = self.read_state()?;
        let journals = state.journals()?;
        match self.existing_journal(journals, branch) {
            Some(journal) => Ok(journal.length()?),
            None => Ok(0),
        }
    }

    /// Every branch with a journal on disk, merged history first.
    pub fn branches(&self) -> MdServerResult<Vec<BranchId>> {
        let state = self.read_state()?;
        state.journals()?;
        self.list_branches()
    }

    fn list_branches(&self) -> MdServerResult<Vec<BranchId>> {
        let dir = self.config.journals_dir();
        let read_dir = match fs::read_dir(&dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut branches = Vec::new();
        for dirent in read_dir {
            let dirent = dirent?;
            let name = dirent.file_name();
            match name.to_str().map(BranchId::from_hex) {
                Some(Ok(branch)) => branches.push(branch),
                _ => warn!(path = %dirent.path().display(), "ignoring unexpected journal directory"),
            }
        }
        branches.sort();
        Ok(branches)
    }

    /// Re-read every journal and object and report invariant violations.
    pub fn verify(&self) -> MdServerResult<VerifyReport> {
        let state = self.read_state()?;
        let journals = state.journals()?;

        let mut report = VerifyReport::new(self.tlf_id);
        for branch in self.list_branches()? {
            let Some(journal) = self.existing_journal(journals, branch) else {
                continue;
            };
            report.branches.push(self.verify_branch(branch, &journal));
        }
        Ok(report)
    }

    fn verify_branch(&self, branch: BranchId, journal: &BranchJournal) -> BranchReport {
        let mut report = BranchReport::new(branch);
        let bounds = match journal.bounds() {
            Ok(Some(bounds)) => bounds,
            Ok(None) => return report,
            Err(e) => {
                report.push(Violation::new(Revision::UNINITIALIZED, ViolationKind::Unreadable, e));
                return report;
            }
        };
        report.earliest = Some(bounds.0);
        report.latest = Some(bounds.1);

        let expected_status = if branch.is_null() {
            MergeStatus::Merged
        } else {
            MergeStatus::Unmerged
        };
        let mut prev_id: Option<MdId> = None;
        for r in bounds.0.as_u64()..=bounds.1.as_u64() {
            let revision = Revision::new(r);
            report.entry_count += 1;

            let entry = match journal.entry(revision) {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    report.push(Violation::new(revision, ViolationKind::MissingEntry, "no entry"));
                    prev_id = None;
                    continue;
                }
                Err(e) => {
                    report.push(Violation::new(revision, ViolationKind::MissingEntry, e));
                    prev_id = None;
                    continue;
                }
            };

            let rmds = match self.objects.get(&entry.id) {
                Ok(rmds) => rmds,
                Err(e) => {
                    let kind = if e.is_integrity() {
                        ViolationKind::HashMismatch
                    } else if e.is_not_found() {
                        ViolationKind::MissingObject
                    } else {
                        ViolationKind::Unreadable
                    };
                    report.push(Violation::new(revision, kind, e));
                    prev_id = None;
                    continue;
                }
            };

            let md = rmds.md();
            if md.revision() != revision {
                report.push(Violation::new(
                    revision,
                    ViolationKind::RevisionMismatch,
                    format!("object holds revision {}", md.revision()),
                ));
            }
            if md.bid() != branch || md.merge_status() != expected_status {
                report.push(Violation::new(
                    revision,
                    ViolationKind::BranchMismatch,
                    format!("object belongs to {} branch {}", md.merge_status(), md.bid()),
                ));
            }
            if let Some(prev_id) = prev_id {
                if md.prev_root != prev_id {
                    report.push(Violation::new(
                        revision,
                        ViolationKind::BrokenChain,
                        format!("prev root {} does not match {}", md.prev_root, prev_id),
                    ));
                }
            }
            prev_id = Some(entry.id);
        }

        if !report.is_valid() {
            warn!(tlf = %self.tlf_id, %branch, violations = report.violations.len(), "branch failed verification");
        }
        report
    }

    /// Stop serving. Every later call fails with
    /// [`MdServerError::Shutdown`].
    pub fn shutdown(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if matches!(*state, Lifecycle::Open(_)) {
            info!(tlf = %self.tlf_id, "TLF storage shut down");
        }
        *state = Lifecycle::Shutdown;
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(
            *self.state.read().unwrap_or_else(|e| e.into_inner()),
            Lifecycle::Shutdown
        )
    }
}

impl std::fmt::Debug for TlfStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlfStorage")
            .field("tlf_id", &self.tlf_id)
            .field("root", &self.config.root)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
