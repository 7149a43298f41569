//! # logexpect - ordered expectations over a live transaction log
//!
//! logexpect consumes a continuously growing transaction log and checks it
//! against an ordered list of expected records. Each expectation tolerates a
//! bounded (or unbounded) number of unrelated records before it must match,
//! and can refer back to the transaction id or tag of the previous match.
//!
//! ## Core Concepts
//!
//! - **Rule**: one compiled expectation: skip budget, vxid matcher, tag matcher
//!   and an optional payload regex
//! - **Session**: a named rule list plus source configuration; the unit of
//!   pass/fail verdict
//! - **Worker**: a background thread that reads the log and drives the
//!   matching cursor for one session run
//! - **Registry**: the named sessions of a test, with start, wait and reset
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use logexpect::{MemoryLogs, Registry, Tag, Transaction};
//!
//! let logs = Arc::new(MemoryLogs::new());
//! let log = logs.create("v1")?;
//!
//! let mut registry = Registry::new(logs.clone());
//! registry.command("l1", &["-v", "v1", "-g", "request"])?;
//! registry.add_rule("l1", &["0", "*", "ReqStart"])?;
//! registry.add_rule("l1", &["0", "=", "ReqURL", "^/foo"])?;
//! registry.start("l1")?;
//!
//! log.append(
//!     Transaction::client(1001)
//!         .record(Tag::ReqStart, "127.0.0.1 51000")
//!         .record(Tag::ReqUrl, "/foo/bar"),
//! )?;
//! registry.wait("l1")?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod filter;
pub mod matcher;
pub mod pattern;
pub mod record;
pub mod registry;
pub mod rule;
pub mod session;
pub mod source;
pub mod tag;
pub mod worker;

// Re-export primary types at crate root for convenience
pub use config::{Grouping, Mode, RegistryConfig, SourceConfig};
pub use error::{ConfigError, LogExpectError, LogExpectResult, MatchFailure, SourceError};
pub use filter::RecordFilter;
pub use matcher::{evaluate, step, Cursor, Step, Verdict};
pub use pattern::RecordPattern;
pub use record::{Origin, RecordView, TransactionView, Vxid};
pub use registry::Registry;
pub use rule::{FieldMatcher, Rule, SkipBudget, TagMatcher, VxidMatcher};
pub use session::Session;
pub use source::{
    BatchHandler, BatchOutcome, Dispatch, LogCursor, LogSource, MemoryCursor, MemoryLog, MemoryLogs, Query, Record,
    Transaction,
};
pub use tag::Tag;
pub use worker::{Outcome, RunId, RunReport};
