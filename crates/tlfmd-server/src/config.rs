use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tlfmd_store::{Codec, FileCodec};
use tlfmd_types::MetadataVer;

/// Where and how a folder's metadata is stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// The folder's root directory.
    pub root: PathBuf,
    /// Encoding of every stored file.
    pub codec: Codec,
    /// Newest metadata format the server accepts.
    pub metadata_version: MetadataVer,
    /// fsync each file before it is renamed into place.
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            codec: Codec::default(),
            metadata_version: MetadataVer::default(),
            sync_writes: false,
        }
    }
}

/// Errors from loading a [`StorageConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl StorageConfig {
    /// Defaults for a folder rooted at `root`.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Load from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn file_codec(&self) -> FileCodec {
        FileCodec::new(self.codec).with_sync_writes(self.sync_writes)
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    pub fn keybundles_dir(&self) -> PathBuf {
        self.root.join("keybundles")
    }

    pub fn journals_dir(&self) -> PathBuf {
        self.root.join("branch_journals")
    }
}
