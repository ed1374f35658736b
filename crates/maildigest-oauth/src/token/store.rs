//! On-disk token persistence, one JSON file per account address.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::TokenSet;
use crate::error::Result;

/// Persists [`TokenSet`]s under a directory.
///
/// Files are replaced whole through a sibling temp file and `rename`, so a
/// reader never sees a half-written token. On Unix the file is created with
/// mode `0600`.
#[derive(Debug, Clone)]
pub struct TokenStore {
    dir: PathBuf,
}

impl TokenStore {
    /// Creates a store rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the token files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the token file for `address`.
    #[must_use]
    pub fn path_for(&self, address: &str) -> PathBuf {
        self.dir
            .join(format!("{}.token.json", encode_file_component(address)))
    }

    /// Loads the token for `address`, or `None` if nothing was stored yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or decoded.
    pub async fn load(&self, address: &str) -> Result<Option<TokenSet>> {
        let path = self.path_for(address);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replaces the stored token for `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub async fn save(&self, address: &str, token: &TokenSet) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(address);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(token)?;

        // A stale temp file may carry looser permissions than we want.
        let _ = tokio::fs::remove_file(&tmp).await;

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), "token saved");
        Ok(())
    }
}

/// Encodes an arbitrary string into a file-name-safe component.
///
/// ASCII alphanumerics and `@._+` pass through; every other byte, including
/// `-`, becomes `%XX`. The output never contains `-`, so it can be joined
/// with `-` separators and split back unambiguously.
#[must_use]
pub fn encode_file_component(raw: &str) -> String {
    use std::fmt::Write as _;

    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'@' | b'.' | b'_' | b'+') {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}
