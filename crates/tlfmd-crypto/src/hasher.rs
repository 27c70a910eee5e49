use tlfmd_types::{ContentHash, HashType};

/// BLAKE3 in key-derivation mode, one context string per kind of stored
/// object. A metadata object and a key bundle with identical bytes never
/// share an address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentHasher {
    context: &'static str,
}

impl ContentHasher {
    pub const METADATA: Self = Self::new("tlfmd 2024 root metadata v1");
    pub const WRITER_BUNDLE: Self = Self::new("tlfmd 2024 writer key bundle v3");
    pub const READER_BUNDLE: Self = Self::new("tlfmd 2024 reader key bundle v3");

    pub const fn new(context: &'static str) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &'static str {
        self.context
    }

    pub fn hash(&self, data: &[u8]) -> ContentHash {
        let digest = blake3::Hasher::new_derive_key(self.context)
            .update(data)
            .finalize();
        ContentHash::new(HashType::Blake3, *digest.as_bytes())
    }

    /// Address of `value` by its bincode encoding, the canonical form of
    /// every stored object.
    pub fn hash_canonical<T: serde::Serialize>(&self, value: &T) -> Result<ContentHash, HasherError> {
        let bytes =
            bincode::serialize(value).map_err(|e| HasherError::Serialization(e.to_string()))?;
        Ok(self.hash(&bytes))
    }

    pub fn verify(&self, data: &[u8], expected: &ContentHash) -> bool {
        expected.hash_type() == HashType::Blake3 && self.hash(data) == *expected
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("cannot encode value for hashing: {0}")]
    Serialization(String),
}
