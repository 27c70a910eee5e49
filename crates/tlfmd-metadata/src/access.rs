use tlfmd_types::UserId;

use crate::bundle::ExtraMetadata;
use crate::root::RootMetadata;

/// Reader/writer capability checks against a folder's head.
pub trait AccessPolicy: Send + Sync {
    /// Whether `uid` may read a folder whose head is `md`.
    fn is_reader(&self, uid: UserId, md: &RootMetadata, extra: Option<&ExtraMetadata>) -> bool;

    /// Whether `uid` may append `next` on top of `prev`: either as a writer
    /// of `prev`, or as a reader performing a valid rekey.
    fn is_writer_or_valid_rekey(
        &self,
        uid: UserId,
        prev: &RootMetadata,
        next: &RootMetadata,
        prev_extra: Option<&ExtraMetadata>,
        next_extra: Option<&ExtraMetadata>,
    ) -> bool;
}

/// Membership in the key bundles decides access.
///
/// A folder without bundles is public: everyone reads it and its public
/// writer set decides who writes.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeyBundleAccess;

impl KeyBundleAccess {
    fn is_writer(uid: UserId, md: &RootMetadata, extra: Option<&ExtraMetadata>) -> bool {
        match extra {
            Some(extra) => extra.bundles().writer.contains(&uid),
            None => md.is_public() && md.writer.public_writers.contains(&uid),
        }
    }

    fn is_valid_rekey(prev: &RootMetadata, next: &RootMetadata) -> bool {
        next.flags.writer_metadata_copied && next.writer == prev.writer
    }
}

impl AccessPolicy for KeyBundleAccess {
    fn is_reader(&self, uid: UserId, md: &RootMetadata, extra: Option<&ExtraMetadata>) -> bool {
        match extra {
            Some(extra) => {
                let pair = extra.bundles();
                pair.writer.contains(&uid) || pair.reader.contains(&uid)
            }
            None => md.is_public(),
        }
    }

    fn is_writer_or_valid_rekey(
        &self,
        uid: UserId,
        prev: &RootMetadata,
        next: &RootMetadata,
        prev_extra: Option<&ExtraMetadata>,
        _next_extra: Option<&ExtraMetadata>,
    ) -> bool {
        if Self::is_writer(uid, prev, prev_extra) {
            return true;
        }
        prev_extra.is_some()
            && self.is_reader(uid, prev, prev_extra)
            && Self::is_valid_rekey(prev, next)
    }
}
