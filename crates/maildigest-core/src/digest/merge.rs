//! Deduplicated merge of two digests of the same folder.

use std::collections::HashSet;

use super::model::MailboxDigest;
use crate::error::{Error, Result};

/// Merges `new` into `old`.
///
/// Every record of `old` is kept unchanged and in order, followed by the
/// records of `new` whose id `old` does not have. The range is the union of
/// both ranges; `uid_validity` and `timestamp` come from `new`.
///
/// # Errors
///
/// Returns [`Error::DigestMismatch`] if the digests belong to different
/// accounts or folders.
pub fn merge(old: &MailboxDigest, new: &MailboxDigest) -> Result<MailboxDigest> {
    if !old.same_mailbox(new) {
        return Err(Error::DigestMismatch {
            expected: format!("{}/{}", old.mail_address(), old.folder_name()),
            found: format!("{}/{}", new.mail_address(), new.folder_name()),
        });
    }

    let known: HashSet<u32> = old.ids().collect();
    let headers = old
        .headers()
        .iter()
        .chain(new.headers().iter().filter(|h| !known.contains(&h.id())))
        .cloned()
        .collect();

    Ok(MailboxDigest::new(
        old.mail_address(),
        old.folder_name(),
        new.uid_validity(),
        old.index_range().union(new.index_range()),
        headers,
        new.timestamp(),
    ))
}
