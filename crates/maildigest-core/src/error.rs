//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IMAP protocol operation failed.
    #[error("IMAP error: {0}")]
    Imap(#[from] async_imap::error::Error),

    /// Could not reach or secure a connection to the server.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Server rejected the credentials.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// OAuth2 session could not be obtained.
    #[error("OAuth2 error: {0}")]
    OAuth(#[from] maildigest_oauth::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A fetch batch failed; the whole fetch is abandoned.
    #[error("Fetch of messages {range} failed: {source}")]
    Batch {
        /// Sequence range of the failed batch.
        range: String,
        /// Underlying failure.
        #[source]
        source: Box<Self>,
    },

    /// Two digests of different mailboxes were combined.
    #[error("Digest mismatch: expected {expected}, found {found}")]
    DigestMismatch {
        /// Mailbox of the older digest.
        expected: String,
        /// Mailbox of the newer digest.
        found: String,
    },

    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for failures that must stop the whole run before any network I/O.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::AccountNotFound(_))
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
