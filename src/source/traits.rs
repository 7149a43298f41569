//! Log source contract.
//!
//! A source opens a reader positioned at the head or tail of a live log.
//! Each [`LogCursor::dispatch`] call hands the next available batch of
//! transactions to a callback. The views passed to the callback borrow the
//! source's buffers and are only valid for that call.

use crate::config::SourceConfig;
use crate::error::SourceError;
use crate::record::TransactionView;

/// What the dispatch callback wants after seeing a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// No verdict yet; keep reading.
    Continue,
    /// Every expectation was satisfied.
    Done,
    /// An expectation failed.
    MatchFailed,
}

/// Result of one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Nothing new in the log yet.
    NoData,
    /// A batch was delivered; no verdict yet.
    Continue,
    /// Every expectation was satisfied.
    Done,
    /// An expectation failed; the failing record was reported to the callback.
    MatchFailed,
}

impl From<BatchOutcome> for Dispatch {
    fn from(outcome: BatchOutcome) -> Self {
        match outcome {
            BatchOutcome::Continue => Self::Continue,
            BatchOutcome::Done => Self::Done,
            BatchOutcome::MatchFailed => Self::MatchFailed,
        }
    }
}

/// Callback invoked with each delivered batch.
pub type BatchHandler<'h> = dyn FnMut(&[TransactionView<'_>]) -> BatchOutcome + 'h;

/// A readable log.
pub trait LogSource: Send + Sync {
    /// Opens a reader as described by `config` (endpoint, mode, grouping,
    /// query). The config's record filter is applied by the caller.
    fn open(&self, config: &SourceConfig) -> Result<Box<dyn LogCursor>, SourceError>;
}

/// A positioned reader over a log.
pub trait LogCursor: Send {
    /// Delivers at most one batch to `on_batch`.
    ///
    /// # Errors
    /// - `Overrun`: the reader fell behind the retained window
    /// - `Backend`: the log is unusable
    fn dispatch(&mut self, on_batch: &mut BatchHandler<'_>) -> Result<Dispatch, SourceError>;

    /// Releases the reader.
    fn close(self: Box<Self>);
}
