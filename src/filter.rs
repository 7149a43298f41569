//! Record selection applied before matching.
//!
//! # Filter Logic
//!
//! - An empty filter passes every record
//! - `-c`/`-b` restrict records to the client or backend side
//! - `-i` tags and `-I` patterns select records: when either is configured a
//!   record must have an included tag or match an applicable include pattern
//! - `-x` tags and `-X` patterns reject records outright
//!
//! A pattern given as `taglist:regex` only applies to records with one of
//! those tags. Patterns honor the caseless flag in effect when they are added.

use std::collections::HashSet;

use crate::error::ConfigError;
use crate::pattern::RecordPattern;
use crate::record::{Origin, RecordView};
use crate::tag::Tag;

#[derive(Debug, Clone)]
struct TaggedPattern {
    tags: Option<HashSet<Tag>>,
    pattern: RecordPattern,
}

impl TaggedPattern {
    /// Parses `[taglist:]regex`.
    fn parse(arg: &str, caseless: bool) -> Result<Self, ConfigError> {
        let (tags, regex) = match arg.split_once(':') {
            // A colon inside the regex itself (e.g. `a:b` with no valid tags)
            // falls back to treating the whole argument as the pattern.
            Some((list, regex)) => match Tag::parse_list(list) {
                Ok(tags) => (Some(tags.into_iter().collect()), regex),
                Err(_) => (None, arg),
            },
            None => (None, arg),
        };
        Ok(Self {
            tags,
            pattern: RecordPattern::compile(regex, caseless)?,
        })
    }

    fn applies_to(&self, tag: Tag) -> bool {
        self.tags.as_ref().map_or(true, |tags| tags.contains(&tag))
    }

    fn matches(&self, record: &RecordView<'_>) -> bool {
        self.applies_to(record.tag) && self.pattern.is_match(record.payload)
    }
}

/// Source-side record filter.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    client: bool,
    backend: bool,
    caseless: bool,
    include_tags: HashSet<Tag>,
    exclude_tags: HashSet<Tag>,
    include_patterns: Vec<TaggedPattern>,
    exclude_patterns: Vec<TaggedPattern>,
}

impl RecordFilter {
    /// Create an empty filter (matches everything)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only pass client-side records (combinable with [`Self::backend_only`]).
    #[must_use]
    pub fn client_only(mut self) -> Self {
        self.client = true;
        self
    }

    /// Only pass backend-side records.
    #[must_use]
    pub fn backend_only(mut self) -> Self {
        self.backend = true;
        self
    }

    /// Make subsequently added patterns case-insensitive.
    #[must_use]
    pub fn caseless(mut self) -> Self {
        self.caseless = true;
        self
    }

    /// Add included tags.
    #[must_use]
    pub fn with_include_tags(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.include_tags.extend(tags);
        self
    }

    /// Add excluded tags.
    #[must_use]
    pub fn with_exclude_tags(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.exclude_tags.extend(tags);
        self
    }

    /// Add an include pattern in `[taglist:]regex` form.
    pub fn include_pattern(&mut self, arg: &str) -> Result<(), ConfigError> {
        let pattern = TaggedPattern::parse(arg, self.caseless)?;
        self.include_patterns.push(pattern);
        Ok(())
    }

    /// Add an exclude pattern in `[taglist:]regex` form.
    pub fn exclude_pattern(&mut self, arg: &str) -> Result<(), ConfigError> {
        let pattern = TaggedPattern::parse(arg, self.caseless)?;
        self.exclude_patterns.push(pattern);
        Ok(())
    }

    /// Applies one filter flag. Returns `Ok(false)` if the flag is not a
    /// filter flag.
    pub fn apply_arg(&mut self, flag: &str, value: Option<&str>) -> Result<bool, ConfigError> {
        let required = || {
            value.ok_or_else(|| ConfigError::MissingArgument {
                flag: flag.to_string(),
            })
        };
        match flag {
            "-b" => self.backend = true,
            "-c" => self.client = true,
            "-C" => self.caseless = true,
            "-i" => self.include_tags.extend(Tag::parse_list(required()?)?),
            "-x" => self.exclude_tags.extend(Tag::parse_list(required()?)?),
            "-I" => self.include_pattern(required()?)?,
            "-X" => self.exclude_pattern(required()?)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// True if the flag consumes a value.
    #[must_use]
    pub fn takes_value(flag: &str) -> bool {
        matches!(flag, "-i" | "-x" | "-I" | "-X")
    }

    /// Check if filter is empty (matches everything)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.client
            && !self.backend
            && self.include_tags.is_empty()
            && self.exclude_tags.is_empty()
            && self.include_patterns.is_empty()
            && self.exclude_patterns.is_empty()
    }

    /// Whether `-C` was given.
    #[must_use]
    pub const fn is_caseless(&self) -> bool {
        self.caseless
    }

    /// Check if a record passes this filter.
    #[must_use]
    pub fn matches(&self, record: &RecordView<'_>) -> bool {
        if self.client || self.backend {
            let side_ok = match record.origin {
                Origin::Client => self.client,
                Origin::Backend => self.backend,
                Origin::Other => false,
            };
            if !side_ok {
                return false;
            }
        }

        if self.exclude_tags.contains(&record.tag)
            || self.exclude_patterns.iter().any(|p| p.matches(record))
        {
            return false;
        }

        if self.include_tags.is_empty() && self.include_patterns.is_empty() {
            return true;
        }
        self.include_tags.contains(&record.tag)
            || self.include_patterns.iter().any(|p| p.matches(record))
    }
}
