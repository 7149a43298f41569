//! Ordered, skip-tolerant record matching.
//!
//! [`evaluate`] is a pure decision on one record against the current rule.
//! [`Cursor`] carries the matching state between records: which rule is
//! current, how many records it has skipped, and the identifiers of the
//! last match for back-references.

use crate::record::{RecordView, Vxid};
use crate::rule::{FieldMatcher, Rule};
use crate::tag::Tag;

/// Decision for one record against one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The record satisfies the rule.
    Match,
    /// The record does not satisfy the rule but the skip budget allows it.
    Skip,
    /// The record does not satisfy the rule and the budget is spent.
    Fail,
}

impl Verdict {
    /// Transcript legend; skips are not reported.
    #[must_use]
    pub const fn legend(self) -> Option<&'static str> {
        match self {
            Self::Match => Some("match"),
            Self::Skip => None,
            Self::Fail => Some("err"),
        }
    }
}

/// Matching state of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    index: usize,
    skip_count: u32,
    last_vxid: Option<Vxid>,
    last_tag: Option<Tag>,
}

impl Cursor {
    /// Cursor at the first rule with no match history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the current rule (equal to the rule count once exhausted).
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Records skipped by the current rule.
    #[must_use]
    pub const fn skip_count(&self) -> u32 {
        self.skip_count
    }

    /// Transaction id of the last matched record.
    #[must_use]
    pub const fn last_vxid(&self) -> Option<Vxid> {
        self.last_vxid
    }

    /// Tag of the last matched record.
    #[must_use]
    pub const fn last_tag(&self) -> Option<Tag> {
        self.last_tag
    }

    /// The rule the next record is evaluated against.
    #[must_use]
    pub fn current<'r>(&self, rules: &'r [Rule]) -> Option<&'r Rule> {
        rules.get(self.index)
    }

    /// True once every rule has matched.
    #[must_use]
    pub fn is_exhausted(&self, rules: &[Rule]) -> bool {
        self.index >= rules.len()
    }

    /// Applies a verdict for `record`. A failure leaves the cursor untouched.
    pub fn apply(&mut self, verdict: Verdict, record: &RecordView<'_>) {
        match verdict {
            Verdict::Match => {
                self.last_vxid = Some(record.vxid);
                self.last_tag = Some(record.tag);
                self.skip_count = 0;
                self.index += 1;
            }
            Verdict::Skip => self.skip_count = self.skip_count.saturating_add(1),
            Verdict::Fail => {}
        }
    }
}

/// Decides whether `record` satisfies `rule` given the cursor's history.
#[must_use]
pub fn evaluate(rule: &Rule, cursor: &Cursor, record: &RecordView<'_>) -> Verdict {
    let vxid_ok = rule.vxid.accepts(record.vxid, cursor.last_vxid);
    let tag_ok = rule.tag.accepts(record.tag, cursor.last_tag);

    // The pattern only applies to records selected by an exact tag.
    let pattern_ok = match (&rule.pattern, rule.tag) {
        (Some(pattern), FieldMatcher::Exact(tag)) if tag == record.tag => {
            pattern.is_match(record.payload)
        }
        _ => true,
    };

    if vxid_ok && tag_ok && pattern_ok {
        Verdict::Match
    } else if rule.skip.allows(cursor.skip_count) {
        Verdict::Skip
    } else {
        Verdict::Fail
    }
}

/// Outcome of feeding one record through a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Internal marker, or no rule left to evaluate.
    Ignored,
    /// Tolerated by the skip budget.
    Skipped,
    /// Matched; `exhausted` is set when that was the last rule.
    Matched {
        /// No rule is left.
        exhausted: bool,
    },
    /// The current rule failed.
    Failed,
}

/// Evaluates `record` against the cursor's current rule and advances it.
pub fn step(rules: &[Rule], cursor: &mut Cursor, record: &RecordView<'_>) -> Step {
    if record.tag.is_internal() {
        return Step::Ignored;
    }
    let Some(rule) = cursor.current(rules) else {
        return Step::Ignored;
    };

    let verdict = evaluate(rule, cursor, record);
    cursor.apply(verdict, record);
    match verdict {
        Verdict::Match => Step::Matched {
            exhausted: cursor.is_exhausted(rules),
        },
        Verdict::Skip => Step::Skipped,
        Verdict::Fail => Step::Failed,
    }
}
