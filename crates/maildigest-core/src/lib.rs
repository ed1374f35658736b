//! # maildigest-core
//!
//! Header digests of IMAP folders.
//!
//! This crate provides:
//! - Account and configuration models
//! - **Date normalization** for the `Date:` formats seen in the wild
//! - **Batched fetch** of UID, flags and the digest header fields
//! - **Digests**: immutable per-folder snapshots, deduplicated merge, and an
//!   on-disk store with atomic writes
//! - **Sync**: full capture and incremental update of a folder
//! - **Hygiene**: flag changes and deletions mirrored into the snapshot
//!
//! The IMAP connection is reached through [`session::MailSession`], so every
//! service can be driven by an in-memory session in tests.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod config;
pub mod date;
pub mod digest;
mod error;
pub mod fetch;
pub mod header;
pub mod service;
pub mod session;

pub use account::{Account, AuthMethod, ValidationError, ValidationResult, validate_account};
pub use config::{AppConfig, EngineConfig, OAuthSettings, ProviderKind};
pub use digest::{
    DigestStore, Flag, FlagOperation, FlagSet, HeaderFields, HeaderRecord, IndexRange,
    MailboxDigest, merge,
};
pub use error::{Error, Result};
pub use fetch::{BatchFetcher, FetchProgress};
pub use service::{DigestSync, SyncOutcome, apply_flags, delete_messages};
pub use session::{Credentials, ImapSession, MailSession, RawMessage};
