use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Algorithm tag carried in the first byte of every content address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum HashType {
    /// Placeholder for the empty hash. Never produced by hashing.
    Invalid = 0x00,
    /// Domain-separated BLAKE3.
    Blake3 = 0x01,
}

impl HashType {
    /// The wire byte for this hash type.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parse a hash type from its wire byte.
    pub fn from_byte(byte: u8) -> Result<Self, TypeError> {
        match byte {
            0x00 => Ok(Self::Invalid),
            0x01 => Ok(Self::Blake3),
            other => Err(TypeError::UnknownHashType(other)),
        }
    }
}

/// A typed content hash: one hash-type byte followed by a 32-byte digest.
///
/// The hex form is 66 characters: two for the hash type, sixty-four for the
/// digest. The first four hex characters (hash type + first digest byte) are
/// used to splay object files across directories.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash {
    hash_type: HashType,
    digest: [u8; 32],
}

impl ContentHash {
    /// Length of the hex representation.
    pub const HEX_LEN: usize = 66;

    /// The empty hash: "no object referenced".
    pub const EMPTY: Self = Self {
        hash_type: HashType::Invalid,
        digest: [0u8; 32],
    };

    /// Wrap a digest produced by the given algorithm.
    pub const fn new(hash_type: HashType, digest: [u8; 32]) -> Self {
        Self { hash_type, digest }
    }

    /// Returns `true` for the empty hash.
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    pub fn hash_type(&self) -> HashType {
        self.hash_type
    }

    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }

    /// Full hex-encoded string (hash type byte first).
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(Self::HEX_LEN);
        s.push_str(&hex::encode([self.hash_type.as_byte()]));
        s.push_str(&hex::encode(self.digest));
        s
    }

    /// Short hex representation (hash type plus first four digest bytes).
    pub fn short_hex(&self) -> String {
        format!(
            "{}{}",
            hex::encode([self.hash_type.as_byte()]),
            hex::encode(&self.digest[..4])
        )
    }

    /// Parse from the 66-character hex form.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 33 {
            return Err(TypeError::InvalidLength {
                expected: 33,
                actual: bytes.len(),
            });
        }
        let hash_type = HashType::from_byte(bytes[0])?;
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&bytes[1..]);
        Ok(Self { hash_type, digest })
    }
}

impl Default for ContentHash {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_default() {
        assert!(ContentHash::default().is_empty());
        assert!(!ContentHash::new(HashType::Blake3, [0; 32]).is_empty());
    }

    #[test]
    fn hex_starts_with_hash_type() {
        let h = ContentHash::new(HashType::Blake3, [0xab; 32]);
        let hex = h.to_hex();
        assert_eq!(hex.len(), ContentHash::HEX_LEN);
        assert!(hex.starts_with("01ab"));
    }

    #[test]
    fn hex_roundtrip() {
        let h = ContentHash::new(HashType::Blake3, [7; 32]);
        assert_eq!(ContentHash::from_hex(&h.to_hex()).unwrap(), h);
    }

    #[test]
    fn from_hex_rejects_unknown_type() {
        let s = format!("7f{}", hex::encode([0u8; 32]));
        assert_eq!(
            ContentHash::from_hex(&s).unwrap_err(),
            TypeError::UnknownHashType(0x7f)
        );
    }

    #[test]
    fn from_hex_rejects_short_input() {
        let err = ContentHash::from_hex("01abcd").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 33,
                actual: 3
            }
        );
    }
}
