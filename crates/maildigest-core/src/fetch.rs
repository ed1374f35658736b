//! Batched header fetch.
//!
//! A folder is drained in fixed-size sequence slices, one request at a time
//! against a single session. Large single requests can time out on busy
//! servers, and slicing gives the caller a progress tick per batch.

use std::num::NonZeroUsize;

use tracing::{debug, warn};

use crate::config::DEFAULT_BATCH_SIZE_NONZERO;
use crate::digest::{Flag, FlagSet, HeaderFields, HeaderRecord, IndexRange};
use crate::error::{Error, Result};
use crate::header::HeaderBlock;
use crate::session::{MailSession, RawMessage};

/// Reported after every completed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProgress {
    /// Sequence numbers covered by the batch just finished.
    pub batch_len: usize,
    /// Sequence numbers covered so far.
    pub fetched: usize,
    /// Sequence numbers in the whole range.
    pub total: usize,
    /// `fetched` as a percentage of `total`.
    pub percent: u8,
}

impl FetchProgress {
    fn new(batch_len: usize, fetched: usize, total: usize) -> Self {
        let percent = if total == 0 {
            100
        } else {
            u8::try_from((fetched.min(total) * 100) / total).unwrap_or(100)
        };
        Self {
            batch_len,
            fetched,
            total,
            percent,
        }
    }
}

/// Pages a sequence range through a [`MailSession`].
#[derive(Debug, Clone, Copy)]
pub struct BatchFetcher {
    batch_size: NonZeroUsize,
}

impl Default for BatchFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE_NONZERO)
    }
}

impl BatchFetcher {
    /// Creates a fetcher requesting `batch_size` messages at a time.
    #[must_use]
    pub const fn new(batch_size: NonZeroUsize) -> Self {
        Self { batch_size }
    }

    /// Messages per request.
    #[must_use]
    pub const fn batch_size(&self) -> NonZeroUsize {
        self.batch_size
    }

    /// Splits `range` into consecutive slices of at most `batch_size`.
    #[must_use]
    pub fn create_batches(&self, range: IndexRange) -> Vec<IndexRange> {
        if range.is_empty() {
            return Vec::new();
        }

        let step = u32::try_from(self.batch_size.get()).unwrap_or(u32::MAX) - 1;
        let mut batches = Vec::new();
        let mut start = range.first;
        loop {
            let end = start.saturating_add(step).min(range.last);
            batches.push(IndexRange::new(start, end));
            if end >= range.last {
                break;
            }
            start = end + 1;
        }
        batches
    }

    /// Fetches every message in `range`, in sequence order.
    ///
    /// `on_progress` is called once per completed batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Batch`] naming the slice if any request fails. Records
    /// from earlier batches are discarded.
    pub async fn fetch<S, F>(
        &self,
        session: &mut S,
        range: IndexRange,
        mut on_progress: F,
    ) -> Result<Vec<HeaderRecord>>
    where
        S: MailSession,
        F: FnMut(FetchProgress),
    {
        let batches = self.create_batches(range);
        let total = range.len() as usize;
        let mut records = Vec::with_capacity(total);
        let mut fetched = 0;

        debug!(%range, batches = batches.len(), "fetching headers");
        for batch in batches {
            let mut raw = session.fetch(batch).await.map_err(|e| Error::Batch {
                range: batch.to_string(),
                source: Box::new(e),
            })?;
            let received = raw.len();
            // Servers may push unsolicited FETCH updates for other messages.
            raw.retain(|m| batch.covers(m.seq));
            if raw.len() < received {
                let dropped = received - raw.len();
                debug!(batch = %batch, dropped, "responses outside batch ignored");
            }
            raw.sort_by_key(|m| m.seq);
            records.extend(raw.into_iter().filter_map(to_record));

            let batch_len = batch.len() as usize;
            fetched += batch_len;
            let progress = FetchProgress::new(batch_len, fetched, total);
            debug!(
                batch = %batch,
                fetched = progress.fetched,
                total = progress.total,
                percent = progress.percent,
                "batch complete"
            );
            on_progress(progress);
        }

        Ok(records)
    }
}

/// Converts one fetched message. Messages without a usable UID are dropped.
fn to_record(raw: RawMessage) -> Option<HeaderRecord> {
    let Some(uid) = raw.uid.filter(|&uid| uid != 0) else {
        warn!(seq = raw.seq, "message without a usable UID skipped");
        return None;
    };

    let block = HeaderBlock::parse(&raw.header);
    let flags: FlagSet = raw.flags.iter().map(|f| Flag::parse(f)).collect();
    Some(HeaderRecord::new(uid, HeaderFields::from_block(&block), flags))
}
