use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A metadata revision number: position in a branch's history.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Revision(u64);

impl Revision {
    /// Sentinel for "no revision yet".
    pub const UNINITIALIZED: Self = Self(0);
    /// The first revision of any folder.
    pub const INITIAL: Self = Self(1);
    /// Largest representable revision. It has no successor.
    pub const MAX: Self = Self(u64::MAX);

    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// The following revision, or `None` at [`Revision::MAX`].
    pub fn checked_next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    /// The following revision, saturating at [`Revision::MAX`].
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// The preceding revision, if any.
    pub fn prev(self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }

    /// Revision `n` steps after this one, or `None` past [`Revision::MAX`].
    pub fn checked_offset(self, n: u64) -> Option<Self> {
        self.0.checked_add(n).map(Self)
    }

    /// Fixed-width (16 character) hex form used for journal file names.
    pub fn to_hex(self) -> String {
        format!("{:016x}", self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        u64::from_str_radix(s.trim(), 16)
            .map(Self)
            .map_err(|e| TypeError::InvalidHex(e.to_string()))
    }
}

impl From<u64> for Revision {
    fn from(n: u64) -> Self {
        Self(n)
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Revision({})", self.0)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a metadata revision belongs to the merged history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergeStatus {
    Merged,
    Unmerged,
}

impl fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merged => write!(f, "merged"),
            Self::Unmerged => write!(f, "unmerged"),
        }
    }
}

/// Metadata format version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetadataVer {
    /// Key material embedded in the metadata itself.
    InitialExtra,
    /// Key bundles stored separately and referenced by content address.
    SegregatedKeyBundles,
}

impl MetadataVer {
    pub fn as_u32(self) -> u32 {
        match self {
            Self::InitialExtra => 2,
            Self::SegregatedKeyBundles => 3,
        }
    }

    pub fn from_u32(v: u32) -> Result<Self, TypeError> {
        match v {
            2 => Ok(Self::InitialExtra),
            3 => Ok(Self::SegregatedKeyBundles),
            other => Err(TypeError::UnknownMetadataVersion(other)),
        }
    }

    /// Whether this version references separately stored key bundles.
    pub fn has_key_bundles(self) -> bool {
        matches!(self, Self::SegregatedKeyBundles)
    }
}

impl Default for MetadataVer {
    fn default() -> Self {
        Self::SegregatedKeyBundles
    }
}

impl fmt::Display for MetadataVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.as_u32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_is_fixed_width() {
        assert_eq!(Revision::new(1).to_hex(), "0000000000000001");
        assert_eq!(Revision::new(0xfff).to_hex(), "0000000000000fff");
    }

    #[test]
    fn hex_roundtrip() {
        let r = Revision::new(123_456);
        assert_eq!(Revision::from_hex(&r.to_hex()).unwrap(), r);
    }

    #[test]
    fn prev_of_zero_is_none() {
        assert_eq!(Revision::UNINITIALIZED.prev(), None);
        assert_eq!(Revision::INITIAL.prev(), Some(Revision::UNINITIALIZED));
        assert_eq!(Revision::INITIAL.next(), Revision::new(2));
        assert_eq!(Revision::INITIAL.checked_next(), Some(Revision::new(2)));
    }

    #[test]
    fn max_has_no_successor() {
        assert_eq!(Revision::MAX.checked_next(), None);
        assert_eq!(Revision::MAX.next(), Revision::MAX);
        assert_eq!(Revision::new(u64::MAX - 2).checked_offset(2), Some(Revision::MAX));
        assert_eq!(Revision::new(u64::MAX - 2).checked_offset(3), None);
    }

    #[test]
    fn metadata_ver_u32_roundtrip() {
        for v in [MetadataVer::InitialExtra, MetadataVer::SegregatedKeyBundles] {
            assert_eq!(MetadataVer::from_u32(v.as_u32()).unwrap(), v);
        }
        assert!(MetadataVer::from_u32(9).is_err());
        assert!(MetadataVer::InitialExtra < MetadataVer::SegregatedKeyBundles);
    }

    proptest::proptest! {
        #[test]
        fn hex_order_matches_numeric_order(a in proptest::prelude::any::<u64>(), b in proptest::prelude::any::<u64>()) {
            let (ra, rb) = (Revision::new(a), Revision::new(b));
            proptest::prop_assert_eq!(ra.to_hex().cmp(&rb.to_hex()), ra.cmp(&rb));
        }
    }
}
