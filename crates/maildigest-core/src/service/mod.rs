//! Digest operations against a live session.
//!
//! [`sync`] builds and updates snapshots; [`hygiene`] changes flags on the
//! server and mirrors the change into an existing snapshot.

pub mod hygiene;
pub mod sync;

pub use hygiene::{apply_flags, delete_messages};
pub use sync::{DigestSync, SyncOutcome};
