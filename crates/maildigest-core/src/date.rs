//! Lenient `Date:` header normalization.
//!
//! Real-world `Date:` headers are inconsistent: long weekday names, trailing
//! zone annotations, single-digit days, numeric months, missing offsets.
//! Rather than a full RFC 5322 grammar, the input is sanitized and then
//! matched against a fixed, ordered list of [`DatePattern`]s. The first
//! pattern that parses wins. Anything else is "no date known", never an error.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Supported header date shapes, in matching priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatePattern {
    /// `2014-10-28T03:42:57-08:00`
    IsoOffset,
    /// `28 Oct 2014 03:42:57`, read as UTC
    DayMonthYear,
    /// `28 Oct 2014 03:42:57 -0800`
    DayMonthYearOffset,
    /// `5 Oct 2014 03:42:57 -0800`
    ShortDayMonthYearOffset,
    /// `Tue, 28 Oct 2014 03:42:57 -0800`
    WeekdayDayMonthYearOffset,
    /// `Tue, 28 10 2014 03:42:57`, read as UTC
    WeekdayNumericMonth,
    /// `Sun, 5 Oct 2014 03:42:57 -0800`
    WeekdayShortDayMonthYearOffset,
}

impl DatePattern {
    /// All patterns, highest priority first.
    pub const ALL: [Self; 7] = [
        Self::IsoOffset,
        Self::DayMonthYear,
        Self::DayMonthYearOffset,
        Self::ShortDayMonthYearOffset,
        Self::WeekdayDayMonthYearOffset,
        Self::WeekdayNumericMonth,
        Self::WeekdayShortDayMonthYearOffset,
    ];

    /// chrono format string for this pattern.
    #[must_use]
    pub const fn format(self) -> &'static str {
        match self {
            Self::IsoOffset => "%Y-%m-%dT%H:%M:%S%:z",
            Self::DayMonthYear => "%d %b %Y %H:%M:%S",
            Self::DayMonthYearOffset | Self::ShortDayMonthYearOffset => "%d %b %Y %H:%M:%S %z",
            Self::WeekdayDayMonthYearOffset | Self::WeekdayShortDayMonthYearOffset => {
                "%a, %d %b %Y %H:%M:%S %z"
            }
            Self::WeekdayNumericMonth => "%a, %d %m %Y %H:%M:%S",
        }
    }

    const fn has_offset(self) -> bool {
        !matches!(self, Self::DayMonthYear | Self::WeekdayNumericMonth)
    }

    /// Space-separated tokens of the pattern. Empty for [`Self::IsoOffset`],
    /// which is checked against [`ISO_LAYOUT`] instead.
    const fn tokens(self) -> &'static [Token] {
        use Token::{Day, MonthName, MonthNumber, Offset, Time, Weekday, Year};
        match self {
            Self::IsoOffset => &[],
            Self::DayMonthYear => &[Day(2), MonthName, Year, Time],
            Self::DayMonthYearOffset => &[Day(2), MonthName, Year, Time, Offset],
            Self::ShortDayMonthYearOffset => &[Day(1), MonthName, Year, Time, Offset],
            Self::WeekdayDayMonthYearOffset => &[Weekday, Day(2), MonthName, Year, Time, Offset],
            Self::WeekdayNumericMonth => &[Weekday, Day(2), MonthNumber, Year, Time],
            Self::WeekdayShortDayMonthYearOffset => {
                &[Weekday, Day(1), MonthName, Year, Time, Offset]
            }
        }
    }

    /// chrono accepts full month and weekday names for `%b`/`%a` and a
    /// single digit for `%d`, `%m` and `%H`. Every field is held to its
    /// fixed width here before chrono sees the text.
    fn has_shape(self, text: &str) -> bool {
        if self == Self::IsoOffset {
            return layout(text.as_bytes(), ISO_LAYOUT);
        }
        let mut parts = text.split(' ');
        self.tokens()
            .iter()
            .all(|token| parts.next().is_some_and(|part| token.matches(part)))
            && parts.next().is_none()
    }

    /// Parses already-sanitized text with this pattern alone.
    #[must_use]
    pub fn parse(self, text: &str) -> Option<DateTime<FixedOffset>> {
        if !self.has_shape(text) {
            return None;
        }

        if self.has_offset() {
            DateTime::parse_from_str(text, self.format()).ok()
        } else {
            NaiveDateTime::parse_from_str(text, self.format())
                .ok()
                .map(|naive| naive.and_utc().fixed_offset())
        }
    }
}

/// `2014-10-28T03:42:57-08:00`: `d` is a digit, `+` a sign.
const ISO_LAYOUT: &[u8] = b"dddd-dd-ddTdd:dd:dd+dd:dd";

/// One field of a space-separated date pattern.
#[derive(Debug, Clone, Copy)]
enum Token {
    /// `Tue,`
    Weekday,
    /// Day of month with exactly this many digits.
    Day(usize),
    /// `Oct`
    MonthName,
    /// `10`
    MonthNumber,
    /// `2014`
    Year,
    /// `03:42:57`
    Time,
    /// `-0800`
    Offset,
}

impl Token {
    fn matches(self, part: &str) -> bool {
        let bytes = part.as_bytes();
        match self {
            Self::Weekday => {
                bytes.len() == 4
                    && bytes[..3].iter().all(u8::is_ascii_alphabetic)
                    && bytes[3] == b','
            }
            Self::Day(width) => bytes.len() == width && bytes.iter().all(u8::is_ascii_digit),
            Self::MonthName => bytes.len() == 3 && bytes.iter().all(u8::is_ascii_alphabetic),
            Self::MonthNumber => layout(bytes, b"dd"),
            Self::Year => layout(bytes, b"dddd"),
            Self::Time => layout(bytes, b"dd:dd:dd"),
            Self::Offset => layout(bytes, b"+dddd"),
        }
    }
}

fn layout(bytes: &[u8], template: &[u8]) -> bool {
    bytes.len() == template.len()
        && bytes.iter().zip(template).all(|(&b, &t)| match t {
            b'd' => b.is_ascii_digit(),
            b'+' => matches!(b, b'+' | b'-'),
            _ => b == t,
        })
}

/// Calendar year and epoch seconds of a parsed header date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDate {
    /// Year in the header's own offset.
    pub year: i32,
    /// Seconds since the Unix epoch.
    pub epoch: i64,
}

impl From<DateTime<FixedOffset>> for ParsedDate {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Self {
            year: dt.year(),
            epoch: dt.timestamp(),
        }
    }
}

/// Applies the pre-match rewrites. Idempotent.
///
/// 1. A trailing ` (ZONE)` annotation directly after a numeric offset is dropped:
///    `... -0500 (CDT)` becomes `... -0500`.
/// 2. A four-letter weekday prefix followed by `, ` and a digit is dropped:
///    `Tues, 28 Oct ...` becomes `28 Oct ...`.
#[must_use]
pub fn sanitize(raw: &str) -> String {
    let text = strip_zone_annotation(raw.trim());
    strip_long_weekday(text).to_string()
}

fn strip_zone_annotation(text: &str) -> &str {
    if !text.ends_with(')') {
        return text;
    }
    let Some(open) = text.rfind(" (") else {
        return text;
    };
    let inner = &text[open + 2..text.len() - 1];
    if inner.contains(['(', ')']) {
        return text;
    }
    let head = &text[..open];
    if ends_with_numeric_offset(head) { head } else { text }
}

fn ends_with_numeric_offset(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() >= 5
        && matches!(bytes[bytes.len() - 5], b'+' | b'-')
        && bytes[bytes.len() - 4..].iter().all(u8::is_ascii_digit)
}

fn strip_long_weekday(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() > 6
        && bytes[..4].iter().all(u8::is_ascii_alphabetic)
        && &bytes[4..6] == b", "
        && bytes[6].is_ascii_digit()
    {
        &text[6..]
    } else {
        text
    }
}

/// Returns the first pattern that parses the sanitized input.
#[must_use]
pub fn classify(raw: &str) -> Option<DatePattern> {
    let text = sanitize(raw);
    DatePattern::ALL
        .into_iter()
        .find(|pattern| pattern.parse(&text).is_some())
}

/// Parses a header date with the first matching pattern.
#[must_use]
pub fn parse(raw: &str) -> Option<DateTime<FixedOffset>> {
    let text = sanitize(raw);
    DatePattern::ALL
        .into_iter()
        .find_map(|pattern| pattern.parse(&text))
}

/// Year and epoch for a header date, or `None` if no pattern matches.
#[must_use]
pub fn parsed_date(raw: &str) -> Option<ParsedDate> {
    parse(raw).map(ParsedDate::from)
}
