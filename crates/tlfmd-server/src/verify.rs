use std::fmt;

use tlfmd_types::{BranchId, Revision, TlfId};

/// Result of [`TlfStorage::verify`](crate::TlfStorage::verify).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifyReport {
    pub tlf_id: TlfId,
    pub branches: Vec<BranchReport>,
}

impl VerifyReport {
    pub fn new(tlf_id: TlfId) -> Self {
        Self {
            tlf_id,
            branches: Vec::new(),
        }
    }

    /// Returns `true` if every branch passed.
    pub fn is_valid(&self) -> bool {
        self.branches.iter().all(BranchReport::is_valid)
    }

    pub fn violation_count(&self) -> usize {
        self.branches.iter().map(|b| b.violations.len()).sum()
    }
}

/// Verification result for one branch journal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchReport {
    pub branch: BranchId,
    pub earliest: Option<Revision>,
    pub latest: Option<Revision>,
    pub entry_count: u64,
    pub violations: Vec<Violation>,
}

impl BranchReport {
    pub fn new(branch: BranchId) -> Self {
        Self {
            branch,
            earliest: None,
            latest: None,
            entry_count: 0,
            violations: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }
}

/// A specific problem found at one revision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub revision: Revision,
    pub kind: ViolationKind,
    pub description: String,
}

impl Violation {
    pub fn new(revision: Revision, kind: ViolationKind, description: impl fmt::Display) -> Self {
        Self {
            revision,
            kind,
            description: description.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// Journal markers or entry files cannot be read.
    Unreadable,
    MissingEntry,
    MissingObject,
    HashMismatch,
    /// The object's revision differs from its journal slot.
    RevisionMismatch,
    /// The object belongs to another branch.
    BranchMismatch,
    /// `prev_root` does not name the previous entry's object.
    BrokenChain,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unreadable => "unreadable",
            Self::MissingEntry => "missing-entry",
            Self::MissingObject => "missing-object",
            Self::HashMismatch => "hash-mismatch",
            Self::RevisionMismatch => "revision-mismatch",
            Self::BranchMismatch => "branch-mismatch",
            Self::BrokenChain => "broken-chain",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_is_valid() {
        let report = VerifyReport::new(TlfId::random());
        assert!(report.is_valid());
        assert_eq!(report.violation_count(), 0);
    }

    #[test]
    fn violation_invalidates_report() {
        let mut branch = BranchReport::new(BranchId::NULL);
        branch.push(Violation::new(
            Revision::new(3),
            ViolationKind::BrokenChain,
            "prev root mismatch",
        ));
        let mut report = VerifyReport::new(TlfId::random());
        report.branches.push(branch);
        assert!(!report.is_valid());
        assert_eq!(report.violation_count(), 1);
        assert_eq!(ViolationKind::BrokenChain.to_string(), "broken-chain");
    }
}
