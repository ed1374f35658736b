//! Message flags as recorded in a digest.

use serde::{Deserialize, Serialize};

/// A system flag or keyword.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Flag {
    /// Message has been read.
    Seen,
    /// Message has been answered.
    Answered,
    /// Message is flagged for special attention.
    Flagged,
    /// Message is marked for deletion.
    Deleted,
    /// Message is a draft.
    Draft,
    /// Message is recent (first session to see it).
    Recent,
    /// Custom keyword flag.
    Keyword(String),
}

impl Flag {
    /// Parses a flag string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "\\SEEN" => Self::Seen,
            "\\ANSWERED" => Self::Answered,
            "\\FLAGGED" => Self::Flagged,
            "\\DELETED" => Self::Deleted,
            "\\DRAFT" => Self::Draft,
            "\\RECENT" => Self::Recent,
            _ => Self::Keyword(s.to_string()),
        }
    }

    /// Returns the flag as an IMAP string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::Keyword(s) => s,
        }
    }
}

impl std::fmt::Display for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Flag {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<Flag> for String {
    fn from(flag: Flag) -> Self {
        flag.as_str().to_string()
    }
}

/// How a flag list is applied to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagOperation {
    /// `+FLAGS`
    Add,
    /// `-FLAGS`
    Remove,
    /// `FLAGS`
    Replace,
}

impl FlagOperation {
    /// IMAP STORE data item name, silent form.
    #[must_use]
    pub const fn store_item(self) -> &'static str {
        match self {
            Self::Add => "+FLAGS.SILENT",
            Self::Remove => "-FLAGS.SILENT",
            Self::Replace => "FLAGS.SILENT",
        }
    }
}

/// Insertion-ordered set of flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Flag>", into = "Vec<Flag>")]
pub struct FlagSet {
    flags: Vec<Flag>,
}

impl FlagSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a flag if absent.
    pub fn insert(&mut self, flag: Flag) {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
    }

    /// Removes a flag.
    pub fn remove(&mut self, flag: &Flag) {
        self.flags.retain(|f| f != flag);
    }

    /// Returns true if the flag is present.
    #[must_use]
    pub fn contains(&self, flag: &Flag) -> bool {
        self.flags.contains(flag)
    }

    /// Returns true if the message has been seen.
    #[must_use]
    pub fn is_seen(&self) -> bool {
        self.contains(&Flag::Seen)
    }

    /// Returns true if the message is marked for deletion.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.contains(&Flag::Deleted)
    }

    /// Result of applying `op` with `flags` to this set.
    #[must_use]
    pub fn applied(&self, op: FlagOperation, flags: &[Flag]) -> Self {
        let mut next = match op {
            FlagOperation::Replace => Self::new(),
            FlagOperation::Add | FlagOperation::Remove => self.clone(),
        };
        for flag in flags {
            match op {
                FlagOperation::Add | FlagOperation::Replace => next.insert(flag.clone()),
                FlagOperation::Remove => next.remove(flag),
            }
        }
        next
    }

    /// Returns an iterator over the flags.
    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.flags.iter()
    }

    /// Returns the number of flags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Returns true if there are no flags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

impl From<Vec<Flag>> for FlagSet {
    fn from(flags: Vec<Flag>) -> Self {
        flags.into_iter().collect()
    }
}

impl From<FlagSet> for Vec<Flag> {
    fn from(set: FlagSet) -> Self {
        set.flags
    }
}

impl FromIterator<Flag> for FlagSet {
    fn from_iter<I: IntoIterator<Item = Flag>>(iter: I) -> Self {
        let mut set = Self::new();
        for flag in iter {
            set.insert(flag);
        }
        set
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_parse() {
        assert_eq!(Flag::parse("\\Seen"), Flag::Seen);
        assert_eq!(Flag::parse("\\DELETED"), Flag::Deleted);
        assert_eq!(Flag::parse("$Junk"), Flag::Keyword("$Junk".to_string()));
    }

    #[test]
    fn test_set_keeps_insertion_order_without_duplicates() {
        let set: FlagSet = vec![Flag::Flagged, Flag::Seen, Flag::Flagged].into();
        let flags: Vec<_> = set.iter().cloned().collect();
        assert_eq!(flags, vec![Flag::Flagged, Flag::Seen]);
    }

    #[test]
    fn test_applied_operations() {
        let set: FlagSet = vec![Flag::Seen].into();

        let added = set.applied(FlagOperation::Add, &[Flag::Deleted]);
        assert!(added.is_seen() && added.is_deleted());

        let removed = added.applied(FlagOperation::Remove, &[Flag::Seen]);
        assert!(!removed.is_seen() && removed.is_deleted());

        let replaced = added.applied(FlagOperation::Replace, &[Flag::Answered]);
        assert_eq!(replaced.len(), 1);
        assert!(replaced.contains(&Flag::Answered));

        // The original is untouched.
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_serializes_as_strings() {
        let set: FlagSet = vec![Flag::Seen, Flag::Keyword("work".into())].into();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["\\Seen","work"]"#);

        let back: FlagSet = serde_json::from_str(r#"["\\Seen","\\Seen","\\Draft"]"#).unwrap();
        assert_eq!(back.len(), 2);
    }
}
