//! Raw post records and their parser.
//!
//! The cache serves one thread as a plain-text body with one post per line.
//! Each line carries five fields separated by `<>`:
//! `name<>mail<>meta<>body<>title`.

use crate::error::{ProtocolError, ProtocolResult};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Separator between fields of a raw record.
pub const FIELD_DELIMITER: &str = "<>";

/// Number of fields in a well-formed record.
pub const FIELD_COUNT: usize = 5;

/// Text encoding of the cache's record feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceEncoding {
    /// Shift_JIS (the Windows-31J superset used by the boards the cache mirrors).
    #[default]
    ShiftJis,
    /// UTF-8.
    Utf8,
}

impl SourceEncoding {
    /// Decodes raw bytes, replacing invalid sequences with U+FFFD.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self {
            SourceEncoding::ShiftJis => {
                let (text, _had_errors) = encoding_rs::SHIFT_JIS.decode_without_bom_handling(bytes);
                text
            }
            SourceEncoding::Utf8 => String::from_utf8_lossy(bytes),
        }
    }

    /// Returns the canonical label.
    pub fn label(&self) -> &'static str {
        match self {
            SourceEncoding::ShiftJis => "shift_jis",
            SourceEncoding::Utf8 => "utf-8",
        }
    }
}

impl fmt::Display for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SourceEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "shift_jis" | "shift-jis" | "sjis" | "cp932" | "windows-31j" => {
                Ok(SourceEncoding::ShiftJis)
            }
            "utf-8" | "utf8" => Ok(SourceEncoding::Utf8),
            other => Err(format!("unsupported source encoding: {other}")),
        }
    }
}

/// One undecoded line of a thread's record feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// 1-based position of the line within its thread.
    pub ordinal: u64,
    /// Line bytes, terminator included when present.
    pub bytes: Vec<u8>,
}

impl RawRecord {
    /// Creates a raw record.
    pub fn new(ordinal: u64, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            ordinal,
            bytes: bytes.into(),
        }
    }

    /// Splits a feed body into records, numbering every line from 1.
    ///
    /// Blank lines keep their ordinal so later posts keep stable identities.
    /// A trailing newline does not produce an extra empty record.
    pub fn split_feed(body: &[u8]) -> Vec<RawRecord> {
        body.split_inclusive(|b| *b == b'\n')
            .zip(1u64..)
            .map(|(line, ordinal)| RawRecord::new(ordinal, line))
            .collect()
    }
}

/// A structured post decoded from a well-formed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    /// Poster name.
    pub name: String,
    /// Mail field (often `sage`).
    pub mail: String,
    /// Date / id metadata.
    pub meta: String,
    /// Post body, HTML-bearing.
    pub body: String,
    /// Thread title (usually only set on the first post).
    pub title: String,
}

impl Post {
    /// Splits an already decoded, terminator-free line into a post.
    ///
    /// Returns the number of fields found when it is not `FIELD_COUNT`.
    pub fn from_line(line: &str) -> Result<Self, usize> {
        let fields: Vec<&str> = line.split(FIELD_DELIMITER).collect();
        match fields.as_slice() {
            [name, mail, meta, body, title] => Ok(Self {
                name: (*name).to_string(),
                mail: (*mail).to_string(),
                meta: (*meta).to_string(),
                body: (*body).to_string(),
                title: (*title).to_string(),
            }),
            _ => Err(fields.len()),
        }
    }
}

/// Decodes one raw record into a post.
///
/// Invalid bytes are replaced during decoding rather than rejected; only a
/// wrong field count fails.
pub fn parse_record(
    locator: &str,
    record: &RawRecord,
    encoding: SourceEncoding,
) -> ProtocolResult<Post> {
    let text = encoding.decode(&record.bytes);
    let line = strip_line_terminator(&text);

    Post::from_line(line).map_err(|found| ProtocolError::RecordParse {
        locator: locator.to_string(),
        ordinal: record.ordinal,
        cause: format!("expected {FIELD_COUNT} fields, found {found}"),
    })
}

fn strip_line_terminator(line: &str) -> &str {
    line.strip_suffix("\r\n")
        .or_else(|| line.strip_suffix('\n'))
        .or_else(|| line.strip_suffix('\r'))
        .unwrap_or(line)
}
