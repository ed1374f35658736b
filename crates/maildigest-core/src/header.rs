//! Header block parsing and RFC 2047 decoding.
//!
//! The fetch asks the server for `BODY.PEEK[HEADER.FIELDS (...)]`, which comes
//! back as a raw header block. Only a handful of fields are needed, so this is
//! a small unfolding parser rather than a full MIME implementation.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

/// Failure decoding an RFC 2047 encoded-word.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Structure is not `=?charset?enc?text?=`.
    #[error("malformed encoded-word: {0}")]
    Malformed(String),
    /// Encoding is neither B nor Q.
    #[error("unknown encoding: {0}")]
    UnknownEncoding(String),
    /// Base64 payload did not decode.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// Q payload had a broken `=XX` escape.
    #[error("invalid quoted-printable escape")]
    QuotedPrintable,
}

/// Unfolded header fields of one message, in wire order.
#[derive(Debug, Clone, Default)]
pub struct HeaderBlock {
    fields: Vec<(String, String)>,
}

impl HeaderBlock {
    /// Parses a raw header block. Names are lowercased, folded continuation
    /// lines are joined with a single space, and parsing stops at the first
    /// empty line. Invalid UTF-8 is replaced rather than rejected.
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let mut fields: Vec<(String, String)> = Vec::new();

        for line in text.lines() {
            if line.is_empty() {
                break;
            }
            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = fields.last_mut() {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(line.trim());
                }
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                fields.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
            }
        }

        Self { fields }
    }

    /// First raw value for `name` (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Decoded value for `name`. Absent or undecodable fields yield `""`.
    #[must_use]
    pub fn text(&self, name: &str) -> String {
        self.get(name)
            .and_then(|raw| decode_rfc2047(raw).ok())
            .unwrap_or_default()
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if no fields were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Decodes every RFC 2047 encoded-word in `text`.
///
/// Whitespace between two adjacent encoded-words is dropped, as the RFC
/// requires. Text outside encoded-words passes through unchanged.
///
/// # Errors
///
/// Returns an error if an encoded-word is malformed.
pub fn decode_rfc2047(text: &str) -> Result<String, DecodeError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut pending_space = String::new();
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, tail) = rest.split_at(start);
        let Some((word, remainder)) = split_encoded_word(tail) else {
            // Not an encoded-word after all; keep the literal `=?`.
            flush(&mut out, &mut pending_space, before);
            out.push_str("=?");
            rest = &tail[2..];
            after_word = false;
            continue;
        };

        if after_word && before.trim().is_empty() {
            pending_space.clear();
        } else {
            flush(&mut out, &mut pending_space, before);
        }

        out.push_str(&decode_word(word)?);
        after_word = true;

        let trimmed = remainder.trim_start();
        pending_space = remainder[..remainder.len() - trimmed.len()].to_string();
        rest = trimmed;
    }

    out.push_str(&pending_space);
    out.push_str(rest);
    Ok(out)
}

fn flush(out: &mut String, pending_space: &mut String, literal: &str) {
    out.push_str(pending_space);
    pending_space.clear();
    out.push_str(literal);
}

/// Splits `=?charset?enc?text?=` off the front of `tail`.
fn split_encoded_word(tail: &str) -> Option<(&str, &str)> {
    let body = tail.strip_prefix("=?")?;
    let charset_end = body.find('?')?;
    let enc_end = charset_end + 1 + body[charset_end + 1..].find('?')?;
    let text_end = enc_end + 1 + body[enc_end + 1..].find("?=")?;
    let word_len = 2 + text_end + 2;
    Some((&tail[..word_len], &tail[word_len..]))
}

fn decode_word(word: &str) -> Result<String, DecodeError> {
    let inner = &word[2..word.len() - 2];
    let mut parts = inner.splitn(3, '?');
    let (Some(charset), Some(encoding), Some(payload)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(DecodeError::Malformed(word.to_string()));
    };

    let bytes = match encoding.to_ascii_uppercase().as_str() {
        "B" => STANDARD.decode(payload)?,
        "Q" => decode_q(payload)?,
        other => return Err(DecodeError::UnknownEncoding(other.to_string())),
    };

    Ok(bytes_to_string(charset, bytes))
}

fn decode_q(payload: &str) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::with_capacity(payload.len());
    let mut bytes = payload.bytes();
    while let Some(b) = bytes.next() {
        match b {
            b'_' => out.push(b' '),
            b'=' => {
                let hi = bytes.next().ok_or(DecodeError::QuotedPrintable)?;
                let lo = bytes.next().ok_or(DecodeError::QuotedPrintable)?;
                let hex = [hi, lo];
                let hex = std::str::from_utf8(&hex).map_err(|_| DecodeError::QuotedPrintable)?;
                out.push(u8::from_str_radix(hex, 16).map_err(|_| DecodeError::QuotedPrintable)?);
            }
            _ => out.push(b),
        }
    }
    Ok(out)
}

/// UTF-8 and ASCII decode directly, Latin-1 maps bytes to code points, and
/// anything else is decoded lossily as UTF-8.
fn bytes_to_string(charset: &str, bytes: Vec<u8>) -> String {
    let charset = charset.split('*').next().unwrap_or(charset);
    if charset.eq_ignore_ascii_case("iso-8859-1") || charset.eq_ignore_ascii_case("latin1") {
        return bytes.into_iter().map(char::from).collect();
    }
    String::from_utf8(bytes)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}
