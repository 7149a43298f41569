//! Log sources.
//!
//! The matching engine reads transactions through the [`LogSource`] and
//! [`LogCursor`] traits. [`MemoryLogs`] is the in-process implementation.

mod memory;
mod query;
mod traits;

pub use memory::{MemoryCursor, MemoryLog, MemoryLogs, Record, Transaction};
pub use query::Query;
pub use traits::{BatchHandler, BatchOutcome, Dispatch, LogCursor, LogSource};
