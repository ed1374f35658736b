//! The mail server as seen by the digest engine.
//!
//! Everything the engine needs from IMAP sits behind [`MailSession`]: a
//! selected folder's size and UIDVALIDITY, a header fetch over a sequence
//! range, flag stores and expunge. [`ImapSession`] is the real
//! implementation; tests drive the engine with in-memory fakes.

mod imap;

pub use imap::ImapSession;

use std::future::Future;

use crate::digest::{Flag, FlagOperation, IndexRange};
use crate::error::Result;

/// Header fields requested for every message.
pub const DIGEST_FIELDS: [&str; 6] = ["DATE", "FROM", "TO", "CC", "BCC", "SUBJECT"];

/// How to authenticate a new connection.
#[derive(Clone)]
pub enum Credentials {
    /// `LOGIN user password`.
    Password(String),
    /// `AUTHENTICATE XOAUTH2` with this access token.
    OAuth2(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Credentials::Password(..)"),
            Self::OAuth2(_) => f.write_str("Credentials::OAuth2(..)"),
        }
    }
}

/// One message as returned by a header fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Sequence number.
    pub seq: u32,
    /// UID, if the server sent one.
    pub uid: Option<u32>,
    /// Flags as IMAP strings, e.g. `\Seen`.
    pub flags: Vec<String>,
    /// Raw header block for [`DIGEST_FIELDS`].
    pub header: Vec<u8>,
}

/// A connected session with one folder selected.
pub trait MailSession: Send {
    /// Messages in the selected folder (`EXISTS`).
    fn message_count(&self) -> u32;

    /// UIDVALIDITY of the selected folder.
    fn uid_validity(&self) -> u32;

    /// Fetches UID, flags and [`DIGEST_FIELDS`] for a sequence range.
    fn fetch(&mut self, range: IndexRange) -> impl Future<Output = Result<Vec<RawMessage>>> + Send;

    /// Applies `op` with `flags` to the messages with the given UIDs.
    fn store_flags(
        &mut self,
        uids: &[u32],
        op: FlagOperation,
        flags: &[Flag],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Permanently removes messages flagged `\Deleted` and returns how many
    /// the server reported removed.
    fn expunge(&mut self) -> impl Future<Output = Result<u32>> + Send;

    /// Logs out and closes the connection.
    fn disconnect(self) -> impl Future<Output = Result<()>> + Send
    where
        Self: Sized;
}

/// Formats UIDs as a compact IMAP sequence set, e.g. `1:3,7,9:10`.
#[must_use]
pub fn uid_set(uids: &[u32]) -> String {
    let mut sorted = uids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut parts = Vec::new();
    let mut iter = sorted.into_iter().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while let Some(next) = end.checked_add(1).filter(|n| iter.peek() == Some(n)) {
            end = next;
            iter.next();
        }
        parts.push(if start == end {
            start.to_string()
        } else {
            format!("{start}:{end}")
        });
    }
    parts.join(",")
}
