use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{StoreError, StoreResult};

/// On-disk encoding for stored files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    Bincode,
    /// Human-readable, for debugging a folder's directory by hand.
    Json,
}

impl Codec {
    pub fn encode<T: Serialize>(&self, value: &T) -> StoreResult<Vec<u8>> {
        match self {
            Self::Bincode => {
                bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
            }
            Self::Json => {
                serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
            }
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> StoreResult<T> {
        match self {
            Self::Bincode => {
                bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
            }
            Self::Json => {
                serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
            }
        }
    }
}

/// A [`Codec`] bound to files, with optional fsync before publishing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileCodec {
    pub codec: Codec,
    pub sync_writes: bool,
}

impl FileCodec {
    pub fn new(codec: Codec) -> Self {
        Self {
            codec,
            sync_writes: false,
        }
    }

    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }

    /// Write `value` to `path` atomically, creating parent directories.
    pub fn serialize_to_file<T: Serialize>(&self, value: &T, path: &Path) -> StoreResult<()> {
        write_atomic(path, &self.codec.encode(value)?, self.sync_writes)
    }

    /// Read and decode the file at `path`.
    ///
    /// A missing file is reported as [`StoreError::NotFound`].
    pub fn deserialize_from_file<T: DeserializeOwned>(&self, path: &Path) -> StoreResult<T> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        self.codec.decode(&bytes)
    }
}

/// Write `bytes` to `path` atomically, creating parent directories.
///
/// The bytes go to a temporary file next to `path` which is then renamed
/// over it, so a reader sees either the old file or the complete new one.
pub fn write_atomic(path: &Path, bytes: &[u8], sync: bool) -> StoreResult<()> {
    let dir = path.parent().ok_or_else(|| {
        StoreError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no parent directory", path.display()),
        ))
    })?;
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    if sync {
        tmp.as_file().sync_all()?;
    }
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}
