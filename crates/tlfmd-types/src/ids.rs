use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::hash::ContentHash;

macro_rules! content_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(ContentHash);

        impl $name {
            /// The empty id ("nothing referenced").
            pub const EMPTY: Self = Self(ContentHash::EMPTY);

            pub const fn from_hash(hash: ContentHash) -> Self {
                Self(hash)
            }

            pub fn hash(&self) -> &ContentHash {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            pub fn to_hex(&self) -> String {
                self.0.to_hex()
            }

            pub fn from_hex(s: &str) -> Result<Self, TypeError> {
                ContentHash::from_hex(s).map(Self)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0.short_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

content_id!(
    /// Content address of a signed metadata object.
    MdId
);
content_id!(
    /// Content address of a writer key bundle.
    WriterBundleId
);
content_id!(
    /// Content address of a reader key bundle.
    ReaderBundleId
);

macro_rules! fixed_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name([u8; 16]);

        impl $name {
            pub const fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn from_hex(s: &str) -> Result<Self, TypeError> {
                let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
                let arr: [u8; 16] = bytes.as_slice().try_into().map_err(|_| {
                    TypeError::InvalidLength {
                        expected: 16,
                        actual: bytes.len(),
                    }
                })?;
                Ok(Self(arr))
            }

            /// Random id, for minting new folders/branches and in tests.
            pub fn random() -> Self {
                let mut bytes = [0u8; 16];
                rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
                Self(bytes)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }
    };
}

fixed_id!(
    /// Identity of the top-level folder (namespace) being served.
    TlfId
);
fixed_id!(
    /// Identity of a revision history fork.
    ///
    /// [`BranchId::NULL`] names the canonical merged history.
    BranchId
);
fixed_id!(
    /// Identity of a user (caller).
    UserId
);

impl BranchId {
    /// The merged (canonical) history.
    pub const NULL: Self = Self([0u8; 16]);

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

impl UserId {
    /// Derive a user id deterministically from a username.
    pub fn derive(username: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"tlfmd-user-v1:");
        hasher.update(username.as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hasher.finalize().as_bytes()[..16]);
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashType;

    #[test]
    fn null_branch_is_default() {
        assert!(BranchId::default().is_null());
        assert_eq!(BranchId::NULL.to_hex(), "0".repeat(32));
    }

    #[test]
    fn random_branches_differ() {
        let a = BranchId::random();
        let b = BranchId::random();
        assert_ne!(a, b);
        assert!(!a.is_null());
    }

    #[test]
    fn fixed_id_hex_roundtrip() {
        let tlf = TlfId::random();
        assert_eq!(TlfId::from_hex(&tlf.to_hex()).unwrap(), tlf);
    }

    #[test]
    fn fixed_id_rejects_wrong_length() {
        let err = BranchId::from_hex("abcd").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 16,
                actual: 2
            }
        );
    }

    #[test]
    fn user_derive_is_deterministic() {
        assert_eq!(UserId::derive("alice"), UserId::derive("alice"));
        assert_ne!(UserId::derive("alice"), UserId::derive("bob"));
    }

    #[test]
    fn md_id_empty_and_display() {
        assert!(MdId::default().is_empty());
        let id = MdId::from_hash(ContentHash::new(HashType::Blake3, [1; 32]));
        assert!(!id.is_empty());
        assert_eq!(format!("{id}"), id.to_hex());
        assert!(format!("{id:?}").starts_with("MdId("));
    }

    #[test]
    fn serde_roundtrip() {
        let id = WriterBundleId::from_hash(ContentHash::new(HashType::Blake3, [3; 32]));
        let json = serde_json::to_string(&id).unwrap();
        let parsed: WriterBundleId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
