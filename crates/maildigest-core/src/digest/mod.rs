//! Mailbox digests: header records, merge, and on-disk snapshots.

mod flags;
mod merge;
pub(crate) mod model;
mod store;

pub use flags::{Flag, FlagOperation, FlagSet};
pub use merge::merge;
pub use model::{HeaderFields, HeaderRecord, IndexRange, MailboxDigest};
pub use store::DigestStore;
