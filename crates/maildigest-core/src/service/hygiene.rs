//! Targeted flag changes, mirrored into the snapshot they were chosen from.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::digest::{DigestStore, Flag, FlagOperation, HeaderRecord, IndexRange, MailboxDigest};
use crate::error::Result;
use crate::session::MailSession;

/// Applies `op` with `flags` to the listed ids on the server, then rewrites
/// the snapshot at `path` with the same change.
///
/// Ids the digest does not contain are skipped. If none remain, the server
/// is not contacted.
///
/// # Errors
///
/// Returns an error if the STORE fails (the snapshot is left untouched) or
/// the snapshot cannot be rewritten.
pub async fn apply_flags<S: MailSession>(
    session: &mut S,
    store: &DigestStore,
    path: &Path,
    digest: &MailboxDigest,
    ids: &[u32],
    op: FlagOperation,
    flags: &[Flag],
) -> Result<MailboxDigest> {
    let known = known_ids(digest, ids);
    if known.is_empty() {
        debug!(folder = digest.folder_name(), "no listed id is in the digest");
        return Ok(digest.clone());
    }

    session.store_flags(&known, op, flags).await?;
    let (updated, touched) = digest.with_flags_applied(&known, op, flags);
    store.rewrite(path, &updated).await?;
    info!(folder = digest.folder_name(), touched, ?op, "flags applied");
    Ok(updated)
}

/// Marks the listed ids `\Deleted`. With `expunge`, also expunges the folder
/// and drops every `\Deleted` record from the snapshot, including ones
/// marked by an earlier call.
///
/// Expunging shifts later sequence numbers down, so the recorded range is
/// shortened by the number of messages the server reports removed. This
/// keeps the next incremental fetch aligned.
///
/// # Errors
///
/// Returns an error if a server command fails or the snapshot cannot be
/// rewritten.
pub async fn delete_messages<S: MailSession>(
    session: &mut S,
    store: &DigestStore,
    path: &Path,
    digest: &MailboxDigest,
    ids: &[u32],
    expunge: bool,
) -> Result<MailboxDigest> {
    let flagged =
        apply_flags(session, store, path, digest, ids, FlagOperation::Add, &[Flag::Deleted])
            .await?;
    if !expunge {
        return Ok(flagged);
    }

    if known_ids(digest, ids).is_empty() {
        return Ok(flagged);
    }
    let removed = session.expunge().await?;

    let deleted: Vec<u32> = flagged
        .headers()
        .iter()
        .filter(|h| h.flags().is_deleted())
        .map(HeaderRecord::id)
        .collect();
    if usize::try_from(removed).is_ok_and(|n| n != deleted.len()) {
        warn!(
            folder = digest.folder_name(),
            removed,
            recorded = deleted.len(),
            "server expunged a different number of messages than the digest marks deleted"
        );
    }

    let remaining = flagged.without(&deleted);
    let range = remaining.index_range();
    let shrunk = MailboxDigest::new(
        remaining.mail_address(),
        remaining.folder_name(),
        remaining.uid_validity(),
        IndexRange::new(range.first, range.last.saturating_sub(removed)),
        remaining.headers().to_vec(),
        remaining.timestamp(),
    );
    store.rewrite(path, &shrunk).await?;
    info!(folder = digest.folder_name(), removed, "messages expunged");
    Ok(shrunk)
}

fn known_ids(digest: &MailboxDigest, ids: &[u32]) -> Vec<u32> {
    let (known, unknown): (Vec<u32>, Vec<u32>) =
        ids.iter().copied().partition(|&id| digest.get(id).is_some());
    if !unknown.is_empty() {
        debug!(?unknown, "ids not in digest ignored");
    }
    known
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::digest::model::tests::digest;
    use crate::fetch::tests::FakeSession;

    async fn saved(dir: &TempDir) -> (DigestStore, std::path::PathBuf, MailboxDigest) {
        let store = DigestStore::new(dir.path());
        let digest = digest(1..=5);
        let path = store.save(&digest).await.unwrap();
        (store, path, digest)
    }

    #[tokio::test]
    async fn test_apply_flags_mirrors_into_snapshot() {
        let dir = TempDir::new().unwrap();
        let (store, path, digest) = saved(&dir).await;
        let mut session = FakeSession::with_messages(5);

        let (ids, op) = ([2, 4, 99], FlagOperation::Add);
        let updated = apply_flags(&mut session, &store, &path, &digest, &ids, op, &[Flag::Flagged])
            .await
            .unwrap();

        assert_eq!(session.stored, vec![(vec![2, 4], FlagOperation::Add, vec![Flag::Flagged])]);
        assert!(updated.get(2).unwrap().flags().contains(&Flag::Flagged));
        assert!(!updated.get(3).unwrap().flags().contains(&Flag::Flagged));
        assert_eq!(store.load(&path).await.unwrap(), updated);
        assert_eq!(store.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_ids_skip_server() {
        let dir = TempDir::new().unwrap();
        let (store, path, digest) = saved(&dir).await;
        let mut session = FakeSession::with_messages(5);

        let op = FlagOperation::Add;
        let updated = apply_flags(&mut session, &store, &path, &digest, &[42], op, &[Flag::Seen])
            .await
            .unwrap();

        assert!(session.stored.is_empty());
        assert_eq!(updated, digest);
    }

    #[tokio::test]
    async fn test_delete_without_expunge_keeps_records() {
        let dir = TempDir::new().unwrap();
        let (store, path, digest) = saved(&dir).await;
        let mut session = FakeSession::with_messages(5);

        let updated = delete_messages(&mut session, &store, &path, &digest, &[1, 3], false)
            .await
            .unwrap();

        assert!(!session.expunged);
        assert_eq!(updated.len(), 5);
        assert!(updated.get(3).unwrap().flags().is_deleted());
    }

    #[tokio::test]
    async fn test_delete_with_expunge_drops_records() {
        let dir = TempDir::new().unwrap();
        let (store, path, digest) = saved(&dir).await;
        let mut session = FakeSession::with_messages(5);

        let updated = delete_messages(&mut session, &store, &path, &digest, &[1, 3], true)
            .await
            .unwrap();

        assert!(session.expunged);
        assert_eq!(updated.ids().collect::<Vec<_>>(), vec![2, 4, 5]);
        assert_eq!(updated.index_range(), IndexRange::new(1, 3));
        assert_eq!(store.load(&path).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_expunge_drops_earlier_deletions_too() {
        let dir = TempDir::new().unwrap();
        let (store, path, digest) = saved(&dir).await;
        let mut session = FakeSession::with_messages(5);

        let marked = delete_messages(&mut session, &store, &path, &digest, &[2], false)
            .await
            .unwrap();
        let updated = delete_messages(&mut session, &store, &path, &marked, &[4], true)
            .await
            .unwrap();

        assert_eq!(session.count, 3);
        assert_eq!(updated.ids().collect::<Vec<_>>(), vec![1, 3, 5]);
        assert_eq!(updated.index_range(), IndexRange::new(1, 3));
        assert_eq!(store.load(&path).await.unwrap(), updated);
    }
}
