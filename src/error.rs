//! Error types for logexpect.
//!
//! All errors are strongly typed using thiserror. Configuration problems,
//! failed expectations and log plumbing failures are kept apart so a caller
//! can tell "the assertion failed" from "the log source broke".

use std::fmt;

use thiserror::Error;

use crate::record::{Origin, Vxid};

/// Errors raised while configuring a session or compiling its rules.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Wrong token count for an expectation.
    #[error("Syntax error: {reason}")]
    Syntax {
        /// What was wrong with the tokens.
        reason: String,
    },

    /// A skip, vxid or numeric option value that is not an integer.
    #[error("Not a positive integer: '{token}'")]
    NotAnInteger {
        /// The offending token.
        token: String,
    },

    /// No tag has this name or prefix.
    #[error("Unknown tag name: '{name}'")]
    UnknownTag {
        /// Name as given.
        name: String,
    },

    /// The prefix selects more than one tag.
    #[error("Ambiguous tag name: '{name}'")]
    AmbiguousTag {
        /// Name as given.
        name: String,
    },

    #[error("Regex error ({message}): '{pattern}' pos {offset}")]
    /// The regular expression does not compile.
    InvalidPattern {
        /// Pattern as given.
        pattern: String,
        /// Compiler message.
        message: String,
        /// Character offset of the error in `pattern`.
        offset: usize,
    },

    /// The `-q` query does not parse.
    #[error("Invalid query '{query}': {reason}")]
    InvalidQuery {
        /// Query as given.
        query: String,
        /// Parser message.
        reason: String,
    },

    /// `-g` names no known grouping.
    #[error("Unknown grouping '{name}'")]
    UnknownGrouping {
        /// Name as given.
        name: String,
    },

    /// An option that takes a value came last.
    #[error("Missing {flag} argument")]
    MissingArgument {
        /// The option.
        flag: String,
    },

    /// Unrecognised option.
    #[error("Unknown logexpect argument: {flag}")]
    UnknownArgument {
        /// The option.
        flag: String,
    },

    /// Start without an endpoint.
    #[error("-v argument not given")]
    MissingEndpoint,

    /// Session names must start with `l`.
    #[error("Logexpect name must start with 'l' (got '{name}')")]
    InvalidName {
        /// Name as given.
        name: String,
    },

    /// The session has an active worker.
    #[error("Session '{name}' is running")]
    SessionRunning {
        /// Session name.
        name: String,
    },

    /// Wait on a session that was never started.
    #[error("logexp not -started '{name}'")]
    NotStarted {
        /// Session name.
        name: String,
    },
}

/// Errors raised by a log source.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The endpoint is unknown or cannot be opened.
    #[error("Cannot open log '{endpoint}': {reason}")]
    Open {
        /// Endpoint as configured.
        endpoint: String,
        /// Why opening failed.
        reason: String,
    },

    #[error("Log overrun: reader at {position}, oldest retained {oldest}")]
    /// The writer lapped the reader.
    Overrun {
        /// Sequence number the reader wanted next.
        position: u64,
        /// Oldest sequence number still retained.
        oldest: u64,
    },

    /// Any other backend failure, including poisoned locks.
    #[error("Log backend error: {0}")]
    Backend(String),
}

/// Diagnostic context for a failed expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchFailure {
    /// Rule that could not be satisfied, in its source form.
    pub rule: String,
    /// Position of that rule in the session's rule list.
    pub rule_index: usize,
    /// Transaction id of the failing record.
    pub vxid: Vxid,
    /// Tag name of the failing record.
    pub tag: String,
    /// Side of the failing record.
    pub origin: Origin,
    /// Payload excerpt of the failing record.
    pub payload: String,
}

impl fmt::Display for MatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expectation #{} `{}` failed at {} {} {} {}",
            self.rule_index,
            self.rule,
            self.vxid,
            self.tag,
            self.origin.as_char(),
            self.payload
        )
    }
}

/// Top-level error type for logexpect.
#[derive(Debug, Error)]
pub enum LogExpectError {
    /// Bad configuration or rule.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A record violated an expectation.
    #[error("Expectation failed: {0}")]
    Expectation(MatchFailure),

    /// The log source failed.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// The worker died without a verdict.
    #[error("Internal error: {message}")]
    Internal {
        /// What went wrong.
        message: String,
    },
}

impl LogExpectError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if an expectation was violated.
    #[must_use]
    pub const fn is_expectation(&self) -> bool {
        matches!(self, Self::Expectation(_))
    }

    /// Returns true if the log source failed.
    #[must_use]
    pub const fn is_source(&self) -> bool {
        matches!(self, Self::Source(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

impl From<MatchFailure> for LogExpectError {
    fn from(failure: MatchFailure) -> Self {
        Self::Expectation(failure)
    }
}

/// Result type alias for logexpect operations.
pub type LogExpectResult<T> = Result<T, LogExpectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_messages() {
        let err = ConfigError::NotAnInteger { token: "x1".to_string() };
        assert_eq!(err.to_string(), "Not a positive integer: 'x1'");

        let err = ConfigError::InvalidPattern {
            pattern: "(".to_string(),
            message: "unclosed group".to_string(),
            offset: 0,
        };
        let msg = err.to_string();
        assert!(msg.contains("unclosed group"));
        assert!(msg.contains("pos 0"));
    }

    #[test]
    fn test_match_failure_display() {
        let failure = MatchFailure {
            rule: "expect 0 = ReqURL \"/foo\"".to_string(),
            rule_index: 1,
            vxid: Vxid::new(9),
            tag: "ReqURL".to_string(),
            origin: Origin::Client,
            payload: "/foo".to_string(),
        };
        let msg = failure.to_string();
        assert!(msg.contains("#1"));
        assert!(msg.contains("9 ReqURL c /foo"));
    }

    #[test]
    fn test_error_classification() {
        let err: LogExpectError = ConfigError::MissingEndpoint.into();
        assert!(err.is_config());
        assert!(!err.is_source());

        let err: LogExpectError = SourceError::Backend("boom".to_string()).into();
        assert!(err.is_source());

        let err = LogExpectError::internal("worker panicked");
        assert!(err.is_internal());
        assert!(err.to_string().contains("worker panicked"));
    }
}
