//! Digest value types.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::flags::{Flag, FlagOperation, FlagSet};
use crate::date::{self, ParsedDate};
use crate::header::HeaderBlock;

/// Decoded header fields of one message. Absent fields are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFields {
    /// Raw `Date:` value.
    pub date: String,
    /// `From:`
    pub from: String,
    /// `To:`
    pub to: String,
    /// `Cc:`
    pub cc: String,
    /// `Bcc:`
    pub bcc: String,
    /// `Subject:`
    pub subject: String,
}

impl HeaderFields {
    /// Extracts the digest fields from a header block, each independently.
    #[must_use]
    pub fn from_block(block: &HeaderBlock) -> Self {
        Self {
            date: block.get("date").unwrap_or_default().to_string(),
            from: block.text("from"),
            to: block.text("to"),
            cc: block.text("cc"),
            bcc: block.text("bcc"),
            subject: block.text("subject"),
        }
    }
}

/// One message's header metadata. Immutable; flag changes produce a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRecord {
    id: u32,
    date_raw: String,
    from: String,
    to: String,
    cc: String,
    bcc: String,
    subject: String,
    flags: FlagSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parsed_date: Option<ParsedDate>,
}

impl HeaderRecord {
    /// Builds a record, deriving year and epoch from the raw date.
    #[must_use]
    pub fn new(id: u32, fields: HeaderFields, flags: FlagSet) -> Self {
        let parsed_date = date::parsed_date(&fields.date);
        Self {
            id,
            date_raw: fields.date,
            from: fields.from,
            to: fields.to,
            cc: fields.cc,
            bcc: fields.bcc,
            subject: fields.subject,
            flags,
            parsed_date,
        }
    }

    /// Server UID.
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Raw `Date:` header.
    #[must_use]
    pub fn date_raw(&self) -> &str {
        &self.date_raw
    }

    /// `From:` header.
    #[must_use]
    pub fn from(&self) -> &str {
        &self.from
    }

    /// `To:` header.
    #[must_use]
    pub fn to(&self) -> &str {
        &self.to
    }

    /// `Cc:` header.
    #[must_use]
    pub fn cc(&self) -> &str {
        &self.cc
    }

    /// `Bcc:` header.
    #[must_use]
    pub fn bcc(&self) -> &str {
        &self.bcc
    }

    /// `Subject:` header.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Flags at capture time.
    #[must_use]
    pub const fn flags(&self) -> &FlagSet {
        &self.flags
    }

    /// Year of the parsed date, if the date was recognized.
    #[must_use]
    pub fn parsed_year(&self) -> Option<i32> {
        self.parsed_date.map(|d| d.year)
    }

    /// Epoch seconds of the parsed date, if the date was recognized.
    #[must_use]
    pub fn parsed_epoch(&self) -> Option<i64> {
        self.parsed_date.map(|d| d.epoch)
    }

    /// Copy of this record with `op` applied to its flags.
    #[must_use]
    pub fn with_flags(&self, op: FlagOperation, flags: &[Flag]) -> Self {
        Self {
            flags: self.flags.applied(op, flags),
            ..self.clone()
        }
    }
}

/// Inclusive range of sequence numbers. `last < first` is the empty range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRange {
    /// First sequence number.
    pub first: u32,
    /// Last sequence number.
    pub last: u32,
}

impl IndexRange {
    /// Creates `first..=last`.
    #[must_use]
    pub const fn new(first: u32, last: u32) -> Self {
        Self { first, last }
    }

    /// The empty range.
    #[must_use]
    pub const fn empty() -> Self {
        Self { first: 1, last: 0 }
    }

    /// `1..=count`, empty when `count` is zero.
    #[must_use]
    pub const fn up_to(count: u32) -> Self {
        Self {
            first: 1,
            last: count,
        }
    }

    /// True if the range covers nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.last < self.first
    }

    /// Number of sequence numbers covered.
    #[must_use]
    pub const fn len(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            self.last - self.first + 1
        }
    }

    /// Smallest range covering both. Empty operands are ignored.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        match (self.is_empty(), other.is_empty()) {
            (true, _) => other,
            (_, true) => self,
            _ => Self::new(self.first.min(other.first), self.last.max(other.last)),
        }
    }

    /// True if `seq` lies within this range.
    #[must_use]
    pub const fn covers(&self, seq: u32) -> bool {
        self.first <= seq && seq <= self.last
    }

    /// True if `other` lies within this range. The empty range lies in every range.
    #[must_use]
    pub const fn contains(&self, other: &Self) -> bool {
        other.is_empty() || (self.first <= other.first && other.last <= self.last)
    }
}

impl std::fmt::Display for IndexRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.first, self.last)
    }
}

/// Persisted header snapshot of one folder of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawDigest")]
pub struct MailboxDigest {
    mail_address: String,
    folder_name: String,
    uid_validity: u32,
    index_range: IndexRange,
    headers: Vec<HeaderRecord>,
    timestamp: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawDigest {
    mail_address: String,
    folder_name: String,
    uid_validity: u32,
    index_range: IndexRange,
    headers: Vec<HeaderRecord>,
    timestamp: DateTime<Utc>,
}

impl From<RawDigest> for MailboxDigest {
    fn from(raw: RawDigest) -> Self {
        Self::new(
            raw.mail_address,
            raw.folder_name,
            raw.uid_validity,
            raw.index_range,
            raw.headers,
            raw.timestamp,
        )
    }
}

impl MailboxDigest {
    /// Creates a digest. Duplicate ids keep their first occurrence.
    #[must_use]
    pub fn new(
        mail_address: impl Into<String>,
        folder_name: impl Into<String>,
        uid_validity: u32,
        index_range: IndexRange,
        headers: Vec<HeaderRecord>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut seen = HashSet::with_capacity(headers.len());
        let headers = headers
            .into_iter()
            .filter(|h| seen.insert(h.id))
            .collect();

        Self {
            mail_address: mail_address.into(),
            folder_name: folder_name.into(),
            uid_validity,
            index_range,
            headers,
            timestamp,
        }
    }

    /// Account address.
    #[must_use]
    pub fn mail_address(&self) -> &str {
        &self.mail_address
    }

    /// Folder name.
    #[must_use]
    pub fn folder_name(&self) -> &str {
        &self.folder_name
    }

    /// UIDVALIDITY at capture time.
    #[must_use]
    pub const fn uid_validity(&self) -> u32 {
        self.uid_validity
    }

    /// Sequence range covered.
    #[must_use]
    pub const fn index_range(&self) -> IndexRange {
        self.index_range
    }

    /// Records in capture order.
    #[must_use]
    pub fn headers(&self) -> &[HeaderRecord] {
        &self.headers
    }

    /// Capture time.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// True if there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// True if both digests describe the same (account, folder).
    #[must_use]
    pub fn same_mailbox(&self, other: &Self) -> bool {
        self.mail_address == other.mail_address && self.folder_name == other.folder_name
    }

    /// Record with the given id.
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&HeaderRecord> {
        self.headers.iter().find(|h| h.id == id)
    }

    /// Ids in capture order.
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.headers.iter().map(HeaderRecord::id)
    }

    /// Message count per parsed year.
    #[must_use]
    pub fn years(&self) -> BTreeMap<i32, usize> {
        let mut years = BTreeMap::new();
        for year in self.headers.iter().filter_map(HeaderRecord::parsed_year) {
            *years.entry(year).or_insert(0) += 1;
        }
        years
    }

    /// Records whose date could not be recognized.
    pub fn unparsed_dates(&self) -> impl Iterator<Item = &HeaderRecord> {
        self.headers.iter().filter(|h| h.parsed_date.is_none())
    }

    /// Records whose `From:` contains `needle`, ignoring ASCII case.
    pub fn with_sender(&self, needle: &str) -> impl Iterator<Item = &HeaderRecord> {
        let needle = needle.to_ascii_lowercase();
        self.headers
            .iter()
            .filter(move |h| h.from.to_ascii_lowercase().contains(&needle))
    }

    /// Copy with `op` applied to the flags of every listed id present here.
    /// Returns the copy and how many records changed.
    #[must_use]
    pub fn with_flags_applied(
        &self,
        ids: &[u32],
        op: FlagOperation,
        flags: &[Flag],
    ) -> (Self, usize) {
        let targets: HashSet<u32> = ids.iter().copied().collect();
        let mut touched = 0;
        let headers = self
            .headers
            .iter()
            .map(|h| {
                if targets.contains(&h.id) {
                    touched += 1;
                    h.with_flags(op, flags)
                } else {
                    h.clone()
                }
            })
            .collect();

        (
            Self {
                headers,
                ..self.clone_meta()
            },
            touched,
        )
    }

    /// Copy without the listed ids.
    #[must_use]
    pub fn without(&self, ids: &[u32]) -> Self {
        let targets: HashSet<u32> = ids.iter().copied().collect();
        Self {
            headers: self
                .headers
                .iter()
                .filter(|h| !targets.contains(&h.id))
                .cloned()
                .collect(),
            ..self.clone_meta()
        }
    }

    pub(crate) fn clone_meta(&self) -> Self {
        Self {
            mail_address: self.mail_address.clone(),
            folder_name: self.folder_name.clone(),
            uid_validity: self.uid_validity,
            index_range: self.index_range,
            headers: Vec::new(),
            timestamp: self.timestamp,
        }
    }
}
