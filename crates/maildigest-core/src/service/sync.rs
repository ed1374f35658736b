//! Full and incremental digest capture.

use std::path::PathBuf;

use maildigest_oauth::time::{Clock, SystemClock};
use tracing::{debug, info, warn};

use crate::digest::{DigestStore, IndexRange, MailboxDigest, merge};
use crate::error::Result;
use crate::fetch::{BatchFetcher, FetchProgress};
use crate::session::MailSession;

/// What [`DigestSync::update`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No earlier snapshot existed; a full one was written.
    Created {
        /// New snapshot.
        path: PathBuf,
        /// Records captured.
        headers: usize,
    },
    /// New messages were merged into a new snapshot.
    Merged {
        /// Records not present in the previous snapshot.
        added: usize,
        /// New snapshot.
        path: PathBuf,
        /// The folder's UIDVALIDITY differs from the previous snapshot's.
        uid_validity_changed: bool,
    },
    /// Nothing new on the server.
    UpToDate {
        /// Latest snapshot, unchanged.
        path: PathBuf,
        /// The folder's UIDVALIDITY differs from the latest snapshot's.
        uid_validity_changed: bool,
    },
}

/// Captures folders into a [`DigestStore`].
#[derive(Debug, Clone)]
pub struct DigestSync<C = SystemClock> {
    store: DigestStore,
    fetcher: BatchFetcher,
    clock: C,
}

impl DigestSync {
    /// Creates a sync service stamping snapshots with the system clock.
    #[must_use]
    pub const fn new(store: DigestStore, fetcher: BatchFetcher) -> Self {
        Self {
            store,
            fetcher,
            clock: SystemClock,
        }
    }
}

impl<C: Clock> DigestSync<C> {
    /// Replaces the clock.
    #[must_use]
    pub fn with_clock<C2: Clock>(self, clock: C2) -> DigestSync<C2> {
        DigestSync {
            store: self.store,
            fetcher: self.fetcher,
            clock,
        }
    }

    /// Snapshot store.
    #[must_use]
    pub const fn store(&self) -> &DigestStore {
        &self.store
    }

    /// Fetches the whole selected folder and saves it as a new snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if any batch fails or the snapshot cannot be written.
    /// Nothing is written on failure.
    pub async fn fetch_full<S, F>(
        &self,
        session: &mut S,
        address: &str,
        folder: &str,
        on_progress: F,
    ) -> Result<(PathBuf, MailboxDigest)>
    where
        S: MailSession,
        F: FnMut(FetchProgress),
    {
        let range = IndexRange::up_to(session.message_count());
        let digest = self.capture(session, address, folder, range, on_progress).await?;
        let path = self.store.save(&digest).await?;
        info!(
            %address,
            %folder,
            headers = digest.len(),
            path = %path.display(),
            "full digest written"
        );
        Ok((path, digest))
    }

    /// Brings the latest snapshot of `(address, folder)` up to date.
    ///
    /// Only sequence numbers past the previous snapshot's range are fetched.
    /// A changed UIDVALIDITY is logged and reported in the outcome but does
    /// not stop the merge.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read, a batch fails, or the
    /// merged snapshot cannot be written.
    pub async fn update<S, F>(
        &self,
        session: &mut S,
        address: &str,
        folder: &str,
        on_progress: F,
    ) -> Result<SyncOutcome>
    where
        S: MailSession,
        F: FnMut(FetchProgress),
    {
        let Some((old_path, old)) = self.store.latest(address, folder).await? else {
            debug!(%address, %folder, "no previous digest");
            let (path, digest) = self.fetch_full(session, address, folder, on_progress).await?;
            return Ok(SyncOutcome::Created {
                path,
                headers: digest.len(),
            });
        };

        let uid_validity_changed = old.uid_validity() != session.uid_validity();
        if uid_validity_changed {
            warn!(
                %address,
                %folder,
                previous = old.uid_validity(),
                current = session.uid_validity(),
                "UIDVALIDITY changed; recorded ids may refer to different messages"
            );
        }

        let first = old.index_range().last.saturating_add(1);
        let range = IndexRange::new(first, session.message_count());
        if range.is_empty() {
            debug!(%address, %folder, "digest up to date");
            return Ok(SyncOutcome::UpToDate {
                path: old_path,
                uid_validity_changed,
            });
        }

        let new = self.capture(session, address, folder, range, on_progress).await?;
        if new.is_empty() {
            debug!(%address, %folder, %range, "no usable messages in new range");
            return Ok(SyncOutcome::UpToDate {
                path: old_path,
                uid_validity_changed,
            });
        }

        let merged = merge(&old, &new)?;
        let added = merged.len() - old.len();
        let path = self.store.save(&merged).await?;
        info!(
            %address,
            %folder,
            added,
            total = merged.len(),
            path = %path.display(),
            "digest merged"
        );
        Ok(SyncOutcome::Merged {
            added,
            path,
            uid_validity_changed,
        })
    }

    async fn capture<S, F>(
        &self,
        session: &mut S,
        address: &str,
        folder: &str,
        range: IndexRange,
        on_progress: F,
    ) -> Result<MailboxDigest>
    where
        S: MailSession,
        F: FnMut(FetchProgress),
    {
        let headers = self.fetcher.fetch(session, range, on_progress).await?;
        Ok(MailboxDigest::new(
            address,
            folder,
            session.uid_validity(),
            range,
            headers,
            self.clock.now(),
        ))
    }
}
