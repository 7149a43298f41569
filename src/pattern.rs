//! Compiled payload patterns.
//!
//! Patterns are regular expressions evaluated against raw record payloads.
//! A compile failure reports the engine's message together with the
//! character offset where parsing stopped.

use std::fmt;

use regex::bytes::{Regex, RegexBuilder};

use crate::error::ConfigError;

/// A compiled regular expression over record payload bytes.
#[derive(Debug, Clone)]
pub struct RecordPattern {
    source: String,
    caseless: bool,
    regex: Regex,
}

impl RecordPattern {
    /// Compiles `pattern`, optionally ignoring case.
    pub fn compile(pattern: &str, caseless: bool) -> Result<Self, ConfigError> {
        match RegexBuilder::new(pattern).case_insensitive(caseless).build() {
            Ok(regex) => Ok(Self {
                source: pattern.to_string(),
                caseless,
                regex,
            }),
            Err(err) => Err(diagnose(pattern, caseless, &err)),
        }
    }

    /// True if the pattern matches anywhere in `payload`.
    #[must_use]
    pub fn is_match(&self, payload: &[u8]) -> bool {
        self.regex.is_match(payload)
    }

    /// The pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the pattern ignores case.
    #[must_use]
    pub const fn is_caseless(&self) -> bool {
        self.caseless
    }
}

impl PartialEq for RecordPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.caseless == other.caseless
    }
}

impl Eq for RecordPattern {}

impl fmt::Display for RecordPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.source)
    }
}

/// Re-parses a rejected pattern to recover a precise position.
fn diagnose(pattern: &str, caseless: bool, err: &regex::Error) -> ConfigError {
    let parsed = regex_syntax::ParserBuilder::new()
        .case_insensitive(caseless)
        .utf8(false)
        .build()
        .parse(pattern);

    let (message, byte_offset) = match parsed {
        Err(regex_syntax::Error::Parse(e)) => (e.kind().to_string(), e.span().start.offset),
        Err(regex_syntax::Error::Translate(e)) => (e.kind().to_string(), e.span().start.offset),
        // Syntax is fine; the compiler rejected it (size limits and the like).
        _ => (err.to_string(), 0),
    };

    ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        message,
        offset: char_offset(pattern, byte_offset),
    }
}

fn char_offset(text: &str, byte_offset: usize) -> usize {
    text.get(..byte_offset)
        .map_or(byte_offset, |prefix| prefix.chars().count())
}
