//! Metadata storage coordinator for a single TLF.
//!
//! [`TlfStorage`] owns a folder's object store, key-bundle store and branch
//! journals, and is the only writer of the folder's directory:
//!
//! ```text
//! <root>/branch_journals/<branch>/{EARLIEST,LATEST,<revision>}
//! <root>/objects/<id prefix>/<id rest>
//! <root>/keybundles/{writer,reader}/<bundle id>
//! ```
//!
//! Every write is validated (signature, attribution, writer capability,
//! successor of the branch head) before anything is persisted, and then
//! persisted object first, journal last.

pub mod config;
pub mod error;
pub mod storage;
pub mod verify;

pub use config::{ConfigError, StorageConfig};
pub use error::{ErrorKind, MdServerError, MdServerResult};
pub use storage::{Collaborators, TlfStorage};
pub use verify::{BranchReport, VerifyReport, Violation, ViolationKind};
