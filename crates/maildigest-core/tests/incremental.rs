//! Integration tests for digest capture and update.
//!
//! These tests drive the sync and hygiene services through an in-memory
//! folder instead of a real IMAP server.

#![allow(clippy::unwrap_used, clippy::cast_possible_truncation)]

use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::Duration;
use tempfile::TempDir;

use maildigest_core::{
    BatchFetcher, DigestStore, DigestSync, Flag, FlagOperation, IndexRange, MailSession,
    RawMessage, Result, SyncOutcome, delete_messages,
};
use maildigest_oauth::time::MockClock;

/// One stored message.
struct Message {
    uid: u32,
    flags: Vec<String>,
    header: Vec<u8>,
}

/// Folder held in memory. Sequence number `n` is `messages[n - 1]`.
struct MemoryFolder {
    uid_validity: u32,
    messages: Vec<Message>,
    fetches: Vec<IndexRange>,
}

impl MemoryFolder {
    fn new() -> Self {
        Self {
            uid_validity: 1,
            messages: Vec::new(),
            fetches: Vec::new(),
        }
    }

    fn deliver(&mut self, date: &str, from: &str, subject: &str) {
        let uid = self.messages.last().map_or(100, |m| m.uid + 1);
        let header = format!(
            "Date: {date}\r\nFrom: {from}\r\nTo: me@example.com\r\nSubject: {subject}\r\n\r\n"
        );
        self.messages.push(Message {
            uid,
            flags: Vec::new(),
            header: header.into_bytes(),
        });
    }

    fn deliver_many(&mut self, count: usize) {
        for i in 0..count {
            self.deliver("Tue, 28 Oct 2014 03:42:57 -0800", &format!("n{i}@example.com"), "hello");
        }
    }
}

impl MailSession for MemoryFolder {
    fn message_count(&self) -> u32 {
        self.messages.len() as u32
    }

    fn uid_validity(&self) -> u32 {
        self.uid_validity
    }

    async fn fetch(&mut self, range: IndexRange) -> Result<Vec<RawMessage>> {
        self.fetches.push(range);
        Ok(self
            .messages
            .iter()
            .enumerate()
            .map(|(i, m)| (i as u32 + 1, m))
            .filter(|(seq, _)| range.first <= *seq && *seq <= range.last)
            .map(|(seq, m)| RawMessage {
                seq,
                uid: Some(m.uid),
                flags: m.flags.clone(),
                header: m.header.clone(),
            })
            .collect())
    }

    async fn store_flags(&mut self, uids: &[u32], op: FlagOperation, flags: &[Flag]) -> Result<()> {
        assert_eq!(op, FlagOperation::Add);
        for message in self.messages.iter_mut().filter(|m| uids.contains(&m.uid)) {
            message.flags.extend(flags.iter().map(ToString::to_string));
        }
        Ok(())
    }

    async fn expunge(&mut self) -> Result<u32> {
        let before = self.messages.len();
        self.messages.retain(|m| !m.flags.iter().any(|f| f == "\\Deleted"));
        Ok((before - self.messages.len()) as u32)
    }

    async fn disconnect(self) -> Result<()> {
        Ok(())
    }
}

fn service(dir: &TempDir, batch: usize) -> (DigestSync<Arc<MockClock>>, Arc<MockClock>) {
    let clock = MockClock::shared(1_714_564_800);
    let sync = DigestSync::new(
        DigestStore::new(dir.path()),
        BatchFetcher::new(NonZeroUsize::new(batch).unwrap()),
    )
    .with_clock(Arc::clone(&clock));
    (sync, clock)
}

#[tokio::test]
async fn test_grown_mailbox_merges_to_fifteen() {
    let dir = TempDir::new().unwrap();
    let (sync, clock) = service(&dir, 4);
    let mut folder = MemoryFolder::new();
    folder.deliver_many(10);

    let first = sync.update(&mut folder, "me@example.com", "INBOX", |_| {}).await.unwrap();
    assert!(matches!(first, SyncOutcome::Created { headers: 10, .. }));
    assert_eq!(folder.fetches.len(), 3);

    folder.deliver_many(5);
    folder.fetches.clear();
    clock.advance(Duration::hours(2));
    let mut ticks = Vec::new();
    let second = sync
        .update(&mut folder, "me@example.com", "INBOX", |p| ticks.push(p.fetched))
        .await
        .unwrap();

    assert_eq!(folder.fetches, vec![IndexRange::new(11, 14), IndexRange::new(15, 15)]);
    assert_eq!(ticks, vec![4, 5]);
    let SyncOutcome::Merged { added: 5, path, .. } = second else {
        panic!("expected five merged records, got {second:?}");
    };

    let (latest_path, latest) =
        sync.store().latest("me@example.com", "INBOX").await.unwrap().unwrap();
    assert_eq!(latest_path, path);
    assert_eq!(latest.len(), 15);
    assert_eq!(latest.index_range(), IndexRange::new(1, 15));
    assert_eq!(latest.ids().collect::<Vec<_>>(), (100..115).collect::<Vec<_>>());
    assert_eq!(latest.years().get(&2014), Some(&15));
}

#[tokio::test]
async fn test_decodes_fields_and_irregular_dates() {
    let dir = TempDir::new().unwrap();
    let (sync, _) = service(&dir, 200);
    let mut folder = MemoryFolder::new();
    folder.deliver(
        "Tues, 28 Oct 2014 03:42:57 -0800",
        "Ann <ann@example.com>",
        "=?UTF-8?Q?Caf=C3=A9_menu?=",
    );
    folder.deliver("someday soon", "bob@example.com", "=?ISO-8859-1?B?SGFsbG8=?=");

    let (_, digest) = sync
        .fetch_full(&mut folder, "me@example.com", "INBOX", |_| {})
        .await
        .unwrap();

    let first = digest.get(100).unwrap();
    assert_eq!(first.subject(), "Café menu");
    assert_eq!(first.parsed_year(), Some(2014));
    assert_eq!(first.parsed_epoch(), Some(1_414_496_577));

    let second = digest.get(101).unwrap();
    assert_eq!(second.subject(), "Hallo");
    assert_eq!(second.parsed_year(), None);
    assert_eq!(digest.unparsed_dates().count(), 1);
    assert_eq!(digest.with_sender("ANN@").count(), 1);
}

#[tokio::test]
async fn test_expunge_keeps_next_update_aligned() {
    let dir = TempDir::new().unwrap();
    let (sync, clock) = service(&dir, 200);
    let mut folder = MemoryFolder::new();
    folder.deliver_many(6);

    let (path, digest) = sync
        .fetch_full(&mut folder, "me@example.com", "INBOX", |_| {})
        .await
        .unwrap();
    let trimmed = delete_messages(&mut folder, sync.store(), &path, &digest, &[101, 103], true)
        .await
        .unwrap();
    assert_eq!(trimmed.len(), 4);
    assert_eq!(folder.message_count(), 4);

    folder.deliver_many(2);
    clock.advance(Duration::minutes(1));
    let outcome = sync.update(&mut folder, "me@example.com", "INBOX", |_| {}).await.unwrap();

    assert!(matches!(outcome, SyncOutcome::Merged { added: 2, .. }));
    let (_, latest) = sync.store().latest("me@example.com", "INBOX").await.unwrap().unwrap();
    assert_eq!(latest.ids().collect::<Vec<_>>(), vec![100, 102, 104, 105, 106, 107]);
}

#[tokio::test]
async fn test_expunge_after_earlier_delete_keeps_update_aligned() {
    let dir = TempDir::new().unwrap();
    let (sync, clock) = service(&dir, 200);
    let mut folder = MemoryFolder::new();
    folder.deliver_many(5);

    let (path, digest) = sync
        .fetch_full(&mut folder, "me@example.com", "INBOX", |_| {})
        .await
        .unwrap();
    let marked = delete_messages(&mut folder, sync.store(), &path, &digest, &[100], false)
        .await
        .unwrap();
    let trimmed = delete_messages(&mut folder, sync.store(), &path, &marked, &[102], true)
        .await
        .unwrap();

    assert_eq!(folder.message_count(), 3);
    assert_eq!(trimmed.ids().collect::<Vec<_>>(), vec![101, 103, 104]);
    assert_eq!(trimmed.index_range(), IndexRange::new(1, 3));

    folder.deliver_many(1);
    clock.advance(Duration::minutes(1));
    let outcome = sync.update(&mut folder, "me@example.com", "INBOX", |_| {}).await.unwrap();

    assert!(matches!(outcome, SyncOutcome::Merged { added: 1, .. }), "got {outcome:?}");
    let (_, latest) = sync.store().latest("me@example.com", "INBOX").await.unwrap().unwrap();
    assert_eq!(latest.ids().collect::<Vec<_>>(), vec![101, 103, 104, 105]);
    assert_eq!(latest.index_range(), IndexRange::new(1, 4));
}

#[tokio::test]
async fn test_folders_and_accounts_are_kept_apart() {
    let dir = TempDir::new().unwrap();
    let (sync, _) = service(&dir, 200);
    let mut inbox = MemoryFolder::new();
    inbox.deliver_many(3);
    let mut archive = MemoryFolder::new();
    archive.deliver_many(1);

    sync.fetch_full(&mut inbox, "me@example.com", "INBOX", |_| {}).await.unwrap();
    sync.fetch_full(&mut archive, "me@example.com", "Archive/2024-old", |_| {}).await.unwrap();
    sync.fetch_full(&mut archive, "other@example.com", "INBOX", |_| {}).await.unwrap();

    let store = sync.store();
    assert_eq!(store.all().await.unwrap().len(), 3);
    let (_, inbox_digest) = store.latest("me@example.com", "INBOX").await.unwrap().unwrap();
    assert_eq!(inbox_digest.len(), 3);
    let (_, archive_digest) =
        store.latest("me@example.com", "Archive/2024-old").await.unwrap().unwrap();
    assert_eq!(archive_digest.folder_name(), "Archive/2024-old");
    assert!(store.latest("nobody@example.com", "INBOX").await.unwrap().is_none());
}
