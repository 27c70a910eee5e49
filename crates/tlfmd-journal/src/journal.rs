use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tlfmd_store::{write_atomic, FileCodec, StoreError};
use tlfmd_types::{MdId, Revision};
use tracing::{debug, warn};

use crate::error::{JournalError, JournalResult};

const EARLIEST: &str = "EARLIEST";
const LATEST: &str = "LATEST";

/// One journal slot: the metadata object stored at a revision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: MdId,
}

impl JournalEntry {
    pub fn new(id: MdId) -> Self {
        Self { id }
    }
}

/// Append-only revision log of one branch.
///
/// Holds no in-memory state beyond its location, so any number of handles
/// may read the same directory. Writers must be serialized by the caller.
#[derive(Clone, Debug)]
pub struct BranchJournal {
    dir: PathBuf,
    codec: FileCodec,
}

impl BranchJournal {
    /// Open the journal at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>, codec: FileCodec) -> JournalResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, codec })
    }

    /// Open the journal at `dir` only if it already exists.
    pub fn open_existing(dir: impl Into<PathBuf>, codec: FileCodec) -> Option<Self> {
        let dir = dir.into();
        dir.is_dir().then_some(Self { dir, codec })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, revision: Revision) -> PathBuf {
        self.dir.join(revision.to_hex())
    }

    fn read_marker(&self, name: &str) -> JournalResult<Option<Revision>> {
        let path = self.dir.join(name);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Revision::from_hex(text.trim())
            .map(Some)
            .map_err(|e| JournalError::Corrupt {
                path,
                reason: e.to_string(),
            })
    }

    fn write_marker(&self, name: &str, revision: Revision) -> JournalResult<()> {
        write_atomic(
            &self.dir.join(name),
            revision.to_hex().as_bytes(),
            self.codec.sync_writes,
        )?;
        Ok(())
    }

    /// First and last revision, or `None` for an empty journal.
    pub fn bounds(&self) -> JournalResult<Option<(Revision, Revision)>> {
        match (self.read_marker(EARLIEST)?, self.read_marker(LATEST)?) {
            (None, None) => Ok(None),
            // The first append writes EARLIEST before LATEST; without LATEST
            // nothing was committed and the next append rewrites both.
            (Some(_), None) => Ok(None),
            (Some(earliest), Some(latest)) if earliest <= latest => Ok(Some((earliest, latest))),
            (earliest, latest) => Err(JournalError::Corrupt {
                path: self.dir.clone(),
                reason: format!("markers disagree: earliest {earliest:?}, latest {latest:?}"),
            }),
        }
    }

    pub fn latest_revision(&self) -> JournalResult<Option<Revision>> {
        Ok(self.bounds()?.map(|(_, latest)| latest))
    }

    /// Number of entries.
    pub fn length(&self) -> JournalResult<u64> {
        Ok(self
            .bounds()?
            .map_or(0, |(earliest, latest)| latest.as_u64() - earliest.as_u64() + 1))
    }

    /// The entry at `revision`, or `None` if it is outside the journal.
    pub fn entry(&self, revision: Revision) -> JournalResult<Option<JournalEntry>> {
        match self.bounds()? {
            Some((earliest, latest)) if earliest <= revision && revision <= latest => {
                self.read_entry(revision).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn read_entry(&self, revision: Revision) -> JournalResult<JournalEntry> {
        match self.codec.deserialize_from_file(&self.entry_path(revision)) {
            Ok(entry) => Ok(entry),
            Err(StoreError::NotFound(_)) => Err(JournalError::Corrupt {
                path: self.entry_path(revision),
                reason: format!("missing entry for revision {revision}"),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// The most recent entry and its revision.
    pub fn latest_entry(&self) -> JournalResult<Option<(Revision, JournalEntry)>> {
        match self.latest_revision()? {
            Some(latest) => Ok(Some((latest, self.read_entry(latest)?))),
            None => Ok(None),
        }
    }

    /// Append `entry` at `revision`.
    ///
    /// The first append fixes the journal's starting revision; every later
    /// one must be exactly one past the latest.
    pub fn append(&self, revision: Revision, entry: &JournalEntry) -> JournalResult<()> {
        let latest = self.latest_revision()?;
        let expected = match latest {
            Some(latest) => latest.checked_next().ok_or(JournalError::Consistency {
                expected: latest,
                actual: revision,
            })?,
            None if revision == Revision::UNINITIALIZED => Revision::INITIAL,
            None => revision,
        };
        if revision != expected {
            warn!(dir = %self.dir.display(), %expected, actual = %revision, "out-of-order journal append");
            return Err(JournalError::Consistency {
                expected,
                actual: revision,
            });
        }

        // Entry first, markers after: a crash in between leaves an orphan
        // entry file that the next append overwrites.
        self.codec
            .serialize_to_file(entry, &self.entry_path(revision))?;
        if latest.is_none() {
            self.write_marker(EARLIEST, revision)?;
        }
        self.write_marker(LATEST, revision)?;

        debug!(dir = %self.dir.display(), %revision, id = %entry.id, "journal append");
        Ok(())
    }

    /// Entries with revisions in `[start, stop]`, clamped to what exists.
    ///
    /// Returns the revision of the first returned entry; the `n`th entry is
    /// at that revision plus `n`.
    pub fn entry_range(
        &self,
        start: Revision,
        stop: Revision,
    ) -> JournalResult<(Revision, Vec<JournalEntry>)> {
        if start > stop {
            return Ok((start, Vec::new()));
        }
        let Some((earliest, latest)) = self.bounds()? else {
            return Ok((start, Vec::new()));
        };

        let real_start = start.max(earliest);
        let real_stop = stop.min(latest);
        if real_start > real_stop {
            return Ok((real_start, Vec::new()));
        }

        let entries = (real_start.as_u64()..=real_stop.as_u64())
            .map(|r| self.read_entry(Revision::new(r)))
            .collect::<JournalResult<Vec<_>>>()?;
        Ok((real_start, entries))
    }
}
