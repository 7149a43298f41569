//! Compiled expectation rules.
//!
//! A rule is one `expect <skip> <vxid> <tag> [regex]` line: how many
//! non-matching records may be tolerated before it, which transaction and
//! tag the next match must carry, and an optional payload pattern.
//!
//! For skip, vxid and tag, `*` matches anything. For vxid and tag, `=`
//! expects the value of the previously matched record.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::pattern::RecordPattern;
use crate::record::Vxid;
use crate::tag::Tag;

/// How many non-matching records a rule tolerates before failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipBudget {
    /// Unbounded.
    Any,
    /// At most this many.
    Limit(u32),
}

impl SkipBudget {
    /// True if another record may be skipped after `skipped` so far.
    #[must_use]
    pub const fn allows(self, skipped: u32) -> bool {
        match self {
            Self::Any => true,
            Self::Limit(max) => skipped < max,
        }
    }
}

impl FromStr for SkipBudget {
    type Err = ConfigError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        if token == "*" {
            return Ok(Self::Any);
        }
        parse_uint(token).map(Self::Limit)
    }
}

impl fmt::Display for SkipBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Limit(n) => write!(f, "{n}"),
        }
    }
}

/// Matcher for one identifying field of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMatcher<T> {
    /// Matches every value.
    Any,
    /// Must equal the same field of the last matched record.
    Backreference,
    /// Must equal this value.
    Exact(T),
}

impl<T: PartialEq + Copy> FieldMatcher<T> {
    /// Checks `value` against this matcher given the last matched value.
    #[must_use]
    pub fn accepts(&self, value: T, last: Option<T>) -> bool {
        match self {
            Self::Any => true,
            Self::Backreference => last == Some(value),
            Self::Exact(expected) => *expected == value,
        }
    }

    /// True if this matcher compares against a previous match.
    #[must_use]
    pub const fn is_backreference(&self) -> bool {
        matches!(self, Self::Backreference)
    }
}

impl<T: fmt::Display> fmt::Display for FieldMatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Backreference => f.write_str("="),
            Self::Exact(v) => write!(f, "{v}"),
        }
    }
}

/// Matcher for the transaction id.
pub type VxidMatcher = FieldMatcher<Vxid>;
/// Matcher for the record tag.
pub type TagMatcher = FieldMatcher<Tag>;

impl FromStr for VxidMatcher {
    type Err = ConfigError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "*" => Ok(Self::Any),
            "=" => Ok(Self::Backreference),
            _ => parse_uint(token).map(|raw| Self::Exact(Vxid::new(raw))),
        }
    }
}

impl FromStr for TagMatcher {
    type Err = ConfigError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "*" => Ok(Self::Any),
            "=" => Ok(Self::Backreference),
            _ => Tag::from_name(token).map(Self::Exact),
        }
    }
}

fn parse_uint(token: &str) -> Result<u32, ConfigError> {
    token.parse::<u32>().map_err(|_| ConfigError::NotAnInteger {
        token: token.to_string(),
    })
}

/// One immutable expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Non-matching records tolerated before this rule fails.
    pub skip: SkipBudget,
    /// Expected transaction id.
    pub vxid: VxidMatcher,
    /// Expected tag.
    pub tag: TagMatcher,
    /// Payload pattern; absent means any payload.
    pub pattern: Option<RecordPattern>,
}

impl Rule {
    /// Creates a rule without a payload pattern.
    #[must_use]
    pub const fn new(skip: SkipBudget, vxid: VxidMatcher, tag: TagMatcher) -> Self {
        Self {
            skip,
            vxid,
            tag,
            pattern: None,
        }
    }

    /// Attaches a payload pattern.
    #[must_use]
    pub fn with_pattern(mut self, pattern: RecordPattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Compiles the arguments of one `expect` line: skip, vxid, tag and an
    /// optional regex. `caseless` is inherited from the session.
    pub fn compile(args: &[&str], caseless: bool) -> Result<Self, ConfigError> {
        let (skip, vxid, tag, pattern) = match *args {
            [skip, vxid, tag] => (skip, vxid, tag, None),
            [skip, vxid, tag, pattern] => (skip, vxid, tag, Some(pattern)),
            _ => {
                return Err(ConfigError::Syntax {
                    reason: format!("expect takes 3 or 4 arguments, got {}", args.len()),
                })
            }
        };

        let mut rule = Self::new(skip.parse()?, vxid.parse()?, tag.parse()?);
        if let Some(pattern) = pattern {
            rule = rule.with_pattern(RecordPattern::compile(pattern, caseless)?);
        }
        Ok(rule)
    }

    /// True if either identifier must equal a previous match.
    #[must_use]
    pub const fn has_backreference(&self) -> bool {
        self.vxid.is_backreference() || self.tag.is_backreference()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expect {} {} {}", self.skip, self.vxid, self.tag)?;
        if let Some(pattern) = &self.pattern {
            write!(f, " {pattern}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_wildcards_and_backreferences() {
        let rule = Rule::compile(&["*", "=", "="], false).unwrap();
        assert_eq!(rule.skip, SkipBudget::Any);
        assert_eq!(rule.vxid, FieldMatcher::Backreference);
        assert_eq!(rule.tag, FieldMatcher::Backreference);
        assert!(rule.pattern.is_none());
        assert!(rule.has_backreference());
    }

    #[test]
    fn compile_exact_values() {
        let rule = Rule::compile(&["2", "1001", "ReqURL", "^/foo"], false).unwrap();
        assert_eq!(rule.skip, SkipBudget::Limit(2));
        assert_eq!(rule.vxid, FieldMatcher::Exact(Vxid::new(1001)));
        assert_eq!(rule.tag, FieldMatcher::Exact(Tag::ReqUrl));
        assert_eq!(rule.pattern.as_ref().map(RecordPattern::as_str), Some("^/foo"));
        assert!(!rule.has_backreference());
    }

    #[test]
    fn skip_rejects_backreference_and_junk() {
        assert!(matches!(
            Rule::compile(&["=", "*", "*"], false),
            Err(ConfigError::NotAnInteger { .. })
        ));
        assert!(matches!(
            Rule::compile(&["-1", "*", "*"], false),
            Err(ConfigError::NotAnInteger { .. })
        ));
        assert!(matches!(
            Rule::compile(&["1x", "*", "*"], false),
            Err(ConfigError::NotAnInteger { .. })
        ));
    }

    #[test]
    fn vxid_rejects_non_numeric() {
        let err = Rule::compile(&["0", "abc", "*"], false).unwrap_err();
        assert_eq!(err, ConfigError::NotAnInteger { token: "abc".to_string() });
    }

    #[test]
    fn unknown_tag_is_a_config_error() {
        let err = Rule::compile(&["0", "*", "NotATag"], false).unwrap_err();
        assert_eq!(err, ConfigError::UnknownTag { name: "NotATag".to_string() });
    }

    #[test]
    fn bad_regex_is_a_config_error() {
        let err = Rule::compile(&["0", "*", "ReqURL", "("], false).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { offset: 0, .. }));
    }

    #[test]
    fn wrong_arity_is_a_syntax_error() {
        assert!(matches!(Rule::compile(&["0", "*"], false), Err(ConfigError::Syntax { .. })));
        assert!(matches!(
            Rule::compile(&["0", "*", "*", "a", "b"], false),
            Err(ConfigError::Syntax { .. })
        ));
    }

    #[test]
    fn caseless_is_inherited() {
        let rule = Rule::compile(&["0", "*", "ReqURL", "FOO"], true).unwrap();
        let pattern = rule.pattern.unwrap();
        assert!(pattern.is_caseless());
        assert!(pattern.is_match(b"/foo"));
    }

    #[test]
    fn display_round_trips_source_form() {
        let rule = Rule::compile(&["*", "=", "ReqURL", "/foo"], false).unwrap();
        assert_eq!(rule.to_string(), "expect * = ReqURL \"/foo\"");
        let rule = Rule::compile(&["0", "7", "*"], false).unwrap();
        assert_eq!(rule.to_string(), "expect 0 7 *");
    }

    #[test]
    fn skip_budget_allows() {
        assert!(SkipBudget::Any.allows(u32::MAX));
        assert!(SkipBudget::Limit(2).allows(1));
        assert!(!SkipBudget::Limit(2).allows(2));
        assert!(!SkipBudget::Limit(0).allows(0));
    }
}
