//! Transaction query expressions understood by the in-memory log.
//!
//! Supported forms:
//!
//! ```text
//! vxid == 1001
//! ReqURL
//! ReqURL eq "/foo"
//! ReqURL ~ "^/foo"
//! ```
//!
//! A transaction is delivered if any of its records satisfies the query.

use crate::error::ConfigError;
use crate::pattern::RecordPattern;
use crate::record::{RecordView, TransactionView, Vxid};
use crate::tag::Tag;

/// A parsed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// `vxid == N`: the transaction id.
    VxidEquals(Vxid),
    /// `Tag`: some record carries the tag.
    HasTag(Tag),
    /// `Tag eq "x"`: some record with the tag has exactly this payload.
    TagEquals(Tag, Vec<u8>),
    /// `Tag ~ "re"`: some record with the tag matches the pattern.
    TagMatches(Tag, RecordPattern),
}

impl Query {
    /// Parses a query; `caseless` applies to `~` patterns.
    pub fn parse(text: &str, caseless: bool) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidQuery {
            query: text.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = text.trim();
        let (lhs, rest) = match trimmed.find(char::is_whitespace) {
            Some(at) => (&trimmed[..at], trimmed[at..].trim_start()),
            None => (trimmed, ""),
        };
        if lhs.is_empty() {
            return Err(invalid("empty query"));
        }

        if lhs.eq_ignore_ascii_case("vxid") {
            let value = rest
                .strip_prefix("==")
                .map(str::trim)
                .ok_or_else(|| invalid("expected '==' after vxid"))?;
            let raw = value
                .parse::<u32>()
                .map_err(|_| invalid("vxid must be a non-negative integer"))?;
            return Ok(Self::VxidEquals(Vxid::new(raw)));
        }

        let tag = Tag::from_name(lhs).map_err(|e| invalid(&e.to_string()))?;
        if rest.is_empty() {
            return Ok(Self::HasTag(tag));
        }

        let (op, operand) = match rest.find(char::is_whitespace) {
            Some(at) => (&rest[..at], rest[at..].trim()),
            None => return Err(invalid("missing operand")),
        };
        let operand = unquote(operand).ok_or_else(|| invalid("operand must be a quoted string"))?;

        match op {
            "eq" => Ok(Self::TagEquals(tag, operand.as_bytes().to_vec())),
            "~" => {
                let pattern = RecordPattern::compile(operand, caseless)
                    .map_err(|e| invalid(&e.to_string()))?;
                Ok(Self::TagMatches(tag, pattern))
            }
            other => Err(invalid(&format!("unsupported operator '{other}'"))),
        }
    }

    fn matches_record(&self, record: &RecordView<'_>) -> bool {
        match self {
            Self::VxidEquals(vxid) => record.vxid == *vxid,
            Self::HasTag(tag) => record.tag == *tag,
            Self::TagEquals(tag, value) => record.tag == *tag && record.payload == value.as_slice(),
            Self::TagMatches(tag, pattern) => record.tag == *tag && pattern.is_match(record.payload),
        }
    }

    /// True if the transaction should be delivered.
    #[must_use]
    pub fn matches(&self, tx: &TransactionView<'_>) -> bool {
        if let Self::VxidEquals(vxid) = self {
            if tx.vxid == *vxid {
                return true;
            }
        }
        tx.records.iter().any(|r| self.matches_record(r))
    }
}

fn unquote(s: &str) -> Option<&str> {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| s.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
}
