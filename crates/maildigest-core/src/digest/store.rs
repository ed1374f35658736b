//! Digest snapshots on disk.
//!
//! Each capture is its own JSON file named
//! `<timestamp>-<address>-<folder>.digest.json`, with address and folder
//! percent-encoded so neither can contain the `-` separator. The timestamp
//! is fixed-width, so the lexicographically greatest name for a mailbox is
//! its latest snapshot.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use maildigest_oauth::token::encode_file_component;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::model::MailboxDigest;
use crate::error::Result;

const EXTENSION: &str = ".digest.json";
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

/// Directory of digest snapshots.
#[derive(Debug, Clone)]
pub struct DigestStore {
    dir: PathBuf,
}

impl DigestStore {
    /// Creates a store rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the snapshots.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name a digest is saved under.
    #[must_use]
    pub fn file_name(digest: &MailboxDigest) -> String {
        format!(
            "{}{}",
            digest.timestamp().format(TIMESTAMP_FORMAT),
            Self::suffix(digest.mail_address(), digest.folder_name())
        )
    }

    fn suffix(address: &str, folder: &str) -> String {
        format!(
            "-{}-{}{EXTENSION}",
            encode_file_component(address),
            encode_file_component(folder)
        )
    }

    /// Saves `digest` as a new snapshot and returns its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub async fn save(&self, digest: &MailboxDigest) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(Self::file_name(digest));
        write_replacing(&path, digest).await?;
        debug!(path = %path.display(), headers = digest.len(), "digest saved");
        Ok(path)
    }

    /// Replaces the snapshot at `path` with `digest`, keeping its name.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn rewrite(&self, path: &Path, digest: &MailboxDigest) -> Result<()> {
        write_replacing(path, digest).await?;
        debug!(path = %path.display(), headers = digest.len(), "digest rewritten in place");
        Ok(())
    }

    /// Loads a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub async fn load(&self, path: &Path) -> Result<MailboxDigest> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Snapshots of one mailbox, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub async fn list(&self, address: &str, folder: &str) -> Result<Vec<PathBuf>> {
        let suffix = Self::suffix(address, folder);
        let mut paths: Vec<PathBuf> = self
            .all()
            .await?
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_suffix(suffix.as_str()))
                    .is_some_and(is_timestamp)
            })
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Latest snapshot of one mailbox, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or the latest file
    /// cannot be decoded.
    pub async fn latest(
        &self,
        address: &str,
        folder: &str,
    ) -> Result<Option<(PathBuf, MailboxDigest)>> {
        let Some(path) = self.list(address, folder).await?.pop() else {
            return Ok(None);
        };
        let digest = self.load(&path).await?;
        Ok(Some((path, digest)))
    }

    /// Every snapshot file in the store, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read.
    pub async fn all(&self) -> Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(EXTENSION) && !n.starts_with('.'))
            {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

fn is_timestamp(prefix: &str) -> bool {
    NaiveDateTime::parse_from_str(prefix, TIMESTAMP_FORMAT).is_ok()
}

/// Writes through a hidden sibling temp file, flushed to disk, and renames
/// it into place.
async fn write_replacing(path: &Path, digest: &MailboxDigest) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(digest)?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("digest");
    let tmp = path.with_file_name(format!(".{name}.tmp"));

    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(&bytes).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::digest::model::tests::digest;
    use crate::digest::model::IndexRange;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn at(digest: &MailboxDigest, hour: u32) -> MailboxDigest {
        MailboxDigest::new(
            digest.mail_address(),
            digest.folder_name(),
            digest.uid_validity(),
            digest.index_range(),
            digest.headers().to_vec(),
            Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_file_name_shape() {
        let d = at(&digest(1..=2), 9);
        assert_eq!(
            DigestStore::file_name(&d),
            "20240501T090000.000Z-me@example.com-INBOX.digest.json"
        );
    }

    #[tokio::test]
    async fn test_latest_picks_newest_of_same_mailbox() {
        let dir = TempDir::new().unwrap();
        let store = DigestStore::new(dir.path());

        store.save(&at(&digest(1..=3), 8)).await.unwrap();
        let newest = store.save(&at(&digest(1..=5), 10)).await.unwrap();
        store.save(&at(&digest(1..=4), 9)).await.unwrap();

        let other = MailboxDigest::new(
            "me@example.com",
            "INBOX-archive",
            1,
            IndexRange::empty(),
            vec![],
            Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        );
        store.save(&other).await.unwrap();

        let (path, latest) = store.latest("me@example.com", "INBOX").await.unwrap().unwrap();
        assert_eq!(path, newest);
        assert_eq!(latest.len(), 5);
        assert_eq!(store.list("me@example.com", "INBOX").await.unwrap().len(), 3);
        assert_eq!(store.all().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_latest_on_missing_dir_is_none() {
        let dir = TempDir::new().unwrap();
        let store = DigestStore::new(dir.path().join("nope"));
        assert!(store.latest("a@b.c", "INBOX").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_suffix_does_not_match_longer_address() {
        let dir = TempDir::new().unwrap();
        let store = DigestStore::new(dir.path());
        let d = MailboxDigest::new(
            "x-me@example.com",
            "INBOX",
            1,
            IndexRange::empty(),
            vec![],
            Utc::now(),
        );
        store.save(&d).await.unwrap();

        assert!(store.latest("me@example.com", "INBOX").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rewrite_keeps_path() {
        let dir = TempDir::new().unwrap();
        let store = DigestStore::new(dir.path());
        let path = store.save(&digest(1..=3)).await.unwrap();

        let smaller = digest(1..=3).without(&[2]);
        store.rewrite(&path, &smaller).await.unwrap();

        assert_eq!(store.all().await.unwrap(), vec![path.clone()]);
        assert_eq!(store.load(&path).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rewrite_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = DigestStore::new(dir.path());
        let path = store.save(&digest(1..=3)).await.unwrap();
        store.rewrite(&path, &digest(1..=4)).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(!names[0].ends_with(".tmp"));
        assert_eq!(store.load(&path).await.unwrap(), digest(1..=4));
    }
}
