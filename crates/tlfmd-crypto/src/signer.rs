//! Device keys. Every metadata revision is signed by one device of the user
//! who last modified it; the server only checks signatures, it never signs.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use ed25519_dalek::Signer;
use serde::{Deserialize, Serialize};

const SECRET_LEN: usize = ed25519_dalek::SECRET_KEY_LENGTH;

/// A device's private key.
pub struct SigningKey(ed25519_dalek::SigningKey);

/// A device's public key. Key bundles list these per user.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct VerifyingKey(ed25519_dalek::VerifyingKey);

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct Signature(ed25519_dalek::Signature);

#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid key")]
    InvalidKey,
    #[error("expected {expected} bytes, found {found}")]
    BadLength { expected: usize, found: usize },
}

fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N], SignatureError> {
    bytes.try_into().map_err(|_| SignatureError::BadLength {
        expected: N,
        found: bytes.len(),
    })
}

impl SigningKey {
    pub fn generate() -> Self {
        Self(ed25519_dalek::SigningKey::generate(&mut rand::thread_rng()))
    }

    pub fn from_bytes(secret: [u8; SECRET_LEN]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(&secret))
    }

    /// Parse a hex-encoded secret, as stored in operator key files.
    /// Surrounding whitespace is ignored.
    pub fn from_hex(s: &str) -> Result<Self, SignatureError> {
        let bytes = hex::decode(s.trim()).map_err(|_| SignatureError::InvalidKey)?;
        Ok(Self::from_bytes(fixed(&bytes)?))
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        self.0.as_bytes()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.0.sign(message))
    }
}

impl VerifyingKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, SignatureError> {
        ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map(Self)
            .map_err(|_| SignatureError::InvalidKey)
    }

    pub fn as_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// Strict verification: rejects small-order keys and malleable
    /// signatures.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), SignatureError> {
        self.0
            .verify_strict(message, &signature.0)
            .map_err(|_| SignatureError::InvalidSignature)
    }
}

impl TryFrom<Vec<u8>> for VerifyingKey {
    type Error = SignatureError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_bytes(fixed(&bytes)?)
    }
}

impl From<VerifyingKey> for Vec<u8> {
    fn from(key: VerifyingKey) -> Self {
        key.as_bytes().to_vec()
    }
}

impl Hash for VerifyingKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl Ord for VerifyingKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(&other.as_bytes())
    }
}

impl PartialOrd for VerifyingKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl TryFrom<Vec<u8>> for Signature {
    type Error = SignatureError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        Ok(Self(ed25519_dalek::Signature::from_bytes(&fixed(&bytes)?)))
    }
}

impl From<Signature> for Vec<u8> {
    fn from(sig: Signature) -> Self {
        sig.0.to_bytes().to_vec()
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(redacted)")
    }
}

impl fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerifyingKey({})", self.to_hex())
    }
}

/// Short form for logs: the first eight bytes.
impl fmt::Display for VerifyingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex()[..16])
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}..)", hex::encode(&self.0.to_bytes()[..8]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---------------------------------------------------------------
    // Signing
    // ---------------------------------------------------------------

    #[test]
    fn device_signature_verifies() {
        let device = SigningKey::generate();
        let sig = device.sign(b"rev 7");
        assert_eq!(device.verifying_key().verify(b"rev 7", &sig), Ok(()));
    }

    #[test]
    fn altered_payload_is_rejected() {
        let device = SigningKey::generate();
        let sig = device.sign(b"rev 7");
        assert_eq!(
            device.verifying_key().verify(b"rev 8", &sig),
            Err(SignatureError::InvalidSignature)
        );
    }

    #[test]
    fn other_device_is_rejected() {
        let sig = SigningKey::generate().sign(b"rev 7");
        assert!(SigningKey::generate()
            .verifying_key()
            .verify(b"rev 7", &sig)
            .is_err());
    }

    // ---------------------------------------------------------------
    // Key material
    // ---------------------------------------------------------------

    #[test]
    fn key_file_hex_parses() {
        let device = SigningKey::generate();
        let text = format!("  {}\n", hex::encode(device.as_bytes()));
        let parsed = SigningKey::from_hex(&text).unwrap();
        assert_eq!(parsed.verifying_key(), device.verifying_key());
    }

    #[test]
    fn short_or_garbled_key_file_fails() {
        assert_eq!(
            SigningKey::from_hex("abcd").unwrap_err(),
            SignatureError::BadLength {
                expected: 32,
                found: 2
            }
        );
        assert_eq!(
            SigningKey::from_hex("not hex").unwrap_err(),
            SignatureError::InvalidKey
        );
    }

    #[test]
    fn public_key_bytes_roundtrip() {
        let vk = SigningKey::generate().verifying_key();
        assert_eq!(VerifyingKey::from_bytes(vk.as_bytes()).unwrap(), vk);
    }

    #[test]
    fn wrong_length_key_does_not_deserialize() {
        let err = VerifyingKey::try_from(vec![0u8; 31]).unwrap_err();
        assert_eq!(
            err,
            SignatureError::BadLength {
                expected: 32,
                found: 31
            }
        );
    }

    #[test]
    fn debug_never_shows_secret() {
        let device = SigningKey::generate();
        let shown = format!("{device:?}");
        assert!(shown.contains("redacted"));
        assert!(!shown.contains(&hex::encode(device.as_bytes())));
    }

    #[test]
    fn display_is_short_prefix() {
        let vk = SigningKey::generate().verifying_key();
        assert_eq!(vk.to_string(), vk.to_hex()[..16]);
    }

    // ---------------------------------------------------------------
    // Encodings
    // ---------------------------------------------------------------

    #[test]
    fn stored_signatures_survive_bincode() {
        let device = SigningKey::generate();
        let pair = (device.verifying_key(), device.sign(b"md"));
        let bytes = bincode::serialize(&pair).unwrap();
        let (vk, sig): (VerifyingKey, Signature) = bincode::deserialize(&bytes).unwrap();
        assert_eq!((vk.clone(), sig.clone()), pair);
        vk.verify(b"md", &sig).unwrap();
    }

    #[test]
    fn stored_signatures_survive_json() {
        let device = SigningKey::generate();
        let pair = (device.verifying_key(), device.sign(b"md"));
        let text = serde_json::to_string(&pair).unwrap();
        let back: (VerifyingKey, Signature) = serde_json::from_str(&text).unwrap();
        assert_eq!(back, pair);
    }
}
