//! Background matching worker.
//!
//! One worker thread runs per started session. It owns the opened log
//! cursor, repeatedly dispatches batches through the matching cursor and
//! reports a single [`RunReport`] over a bounded reply channel.
//!
//! The log cursor is closed exactly once when the worker finishes, whether it
//! succeeded, failed, hit a source error, was cancelled, or panicked.
//! Cancellation is cooperative: the flag is checked between polls and at
//! transaction boundaries, never while a record is being evaluated.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, trace, warn};
use uuid::Uuid;

use crate::error::{LogExpectError, LogExpectResult, MatchFailure, SourceError};
use crate::filter::RecordFilter;
use crate::matcher::{self, Cursor, Step};
use crate::record::{RecordView, TransactionView};
use crate::rule::Rule;
use crate::source::{BatchHandler, BatchOutcome, Dispatch, LogCursor};

/// Identifies one run of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a new random run id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Every rule matched.
    Success,
    /// A record violated the current rule.
    Failure(MatchFailure),
    /// The log source failed.
    Fatal(SourceError),
    /// Stopped on request before a verdict.
    Cancelled,
}

impl Outcome {
    /// Maps the outcome to the caller-facing result. Cancellation is not an
    /// error for the caller that requested it.
    pub fn into_result(self) -> LogExpectResult<()> {
        match self {
            Self::Success | Self::Cancelled => Ok(()),
            Self::Failure(failure) => Err(LogExpectError::Expectation(failure)),
            Self::Fatal(err) => Err(LogExpectError::Source(err)),
        }
    }

    /// True if every rule matched.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Final state of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Run this report belongs to.
    pub run_id: RunId,
    /// Verdict of the run.
    pub outcome: Outcome,
    /// Matching cursor when the run ended.
    pub cursor: Cursor,
    /// Records evaluated against a rule (filtered and marker records excluded).
    pub records_evaluated: u64,
    /// When the worker thread began.
    pub started_at: DateTime<Utc>,
    /// When the worker thread produced its verdict.
    pub finished_at: DateTime<Utc>,
}

/// Everything a worker needs, copied out of its session at start.
#[derive(Debug, Clone)]
pub(crate) struct WorkerSpec {
    pub session: String,
    pub rules: Vec<Rule>,
    pub filter: RecordFilter,
    pub query: Option<String>,
    pub poll_interval: Duration,
    pub excerpt_limit: usize,
    pub thread_name: String,
}

/// Closes the log cursor when dropped.
struct CursorGuard(Option<Box<dyn LogCursor>>);

impl CursorGuard {
    fn dispatch(&mut self, on_batch: &mut BatchHandler<'_>) -> Result<Dispatch, SourceError> {
        match self.0.as_mut() {
            Some(cursor) => cursor.dispatch(on_batch),
            None => Err(SourceError::Backend("cursor already closed".to_string())),
        }
    }
}

impl Drop for CursorGuard {
    fn drop(&mut self) {
        if let Some(cursor) = self.0.take() {
            cursor.close();
        }
    }
}

/// Matching state driven by dispatch callbacks.
struct Matching<'a> {
    spec: &'a WorkerSpec,
    cancel: &'a AtomicBool,
    cursor: Cursor,
    failure: Option<MatchFailure>,
    records_evaluated: u64,
}

impl<'a> Matching<'a> {
    fn new(spec: &'a WorkerSpec, cancel: &'a AtomicBool) -> Self {
        Self {
            spec,
            cancel,
            cursor: Cursor::new(),
            failure: None,
            records_evaluated: 0,
        }
    }

    fn announce_current(&self) {
        if let Some(rule) = self.cursor.current(&self.spec.rules) {
            info!(index = self.cursor.index(), "expecting| {rule}");
        }
    }

    fn on_batch(&mut self, txs: &[TransactionView<'_>]) -> BatchOutcome {
        for tx in txs {
            if self.cancel.load(Ordering::Acquire) {
                return BatchOutcome::Continue;
            }
            for record in tx.records {
                if !self.spec.filter.matches(record) {
                    continue;
                }
                if let Some(outcome) = self.on_record(record) {
                    return outcome;
                }
            }
        }
        BatchOutcome::Continue
    }

    fn on_record(&mut self, record: &RecordView<'_>) -> Option<BatchOutcome> {
        let rule_index = self.cursor.index();
        let step = matcher::step(&self.spec.rules, &mut self.cursor, record);
        if step != Step::Ignored {
            self.records_evaluated += 1;
        }

        match step {
            Step::Ignored => None,
            Step::Skipped => {
                trace!(
                    vxid = record.vxid.get(),
                    tag = record.tag.name(),
                    skipped = self.cursor.skip_count(),
                    "skip"
                );
                None
            }
            Step::Matched { exhausted } => {
                self.log_verdict("match", record);
                if exhausted {
                    return Some(BatchOutcome::Done);
                }
                self.announce_current();
                None
            }
            Step::Failed => {
                self.log_verdict("err", record);
                let rule = self
                    .spec
                    .rules
                    .get(rule_index)
                    .map(ToString::to_string)
                    .unwrap_or_default();
                self.failure = Some(MatchFailure {
                    rule,
                    rule_index,
                    vxid: record.vxid,
                    tag: record.tag.name().to_string(),
                    origin: record.origin,
                    payload: record.excerpt(self.spec.excerpt_limit),
                });
                Some(BatchOutcome::MatchFailed)
            }
        }
    }

    fn log_verdict(&self, legend: &str, record: &RecordView<'_>) {
        info!(
            "{legend:>3}| {:>10} {:<15} {} {}",
            record.vxid.get(),
            record.tag.name(),
            record.origin.as_char(),
            record.excerpt(self.spec.excerpt_limit)
        );
    }
}

fn run(spec: &WorkerSpec, cancel: &AtomicBool, cursor: Box<dyn LogCursor>) -> (Outcome, Cursor, u64) {
    let mut guard = CursorGuard(Some(cursor));
    let mut matching = Matching::new(spec, cancel);

    info!("begin|");
    if let Some(query) = &spec.query {
        info!("qry| {query}");
    }
    matching.announce_current();

    let outcome = loop {
        if matching.cursor.is_exhausted(&spec.rules) {
            break Outcome::Success;
        }
        if cancel.load(Ordering::Acquire) {
            break Outcome::Cancelled;
        }

        match guard.dispatch(&mut |txs| matching.on_batch(txs)) {
            Ok(Dispatch::NoData) => thread::sleep(spec.poll_interval),
            Ok(Dispatch::Continue) => {}
            Ok(Dispatch::Done) => break Outcome::Success,
            Ok(Dispatch::MatchFailed) => match matching.failure.take() {
                Some(failure) => break Outcome::Failure(failure),
                None => {
                    break Outcome::Fatal(SourceError::Backend(
                        "dispatch reported a failure without a failing record".to_string(),
                    ))
                }
            },
            Err(err) => break Outcome::Fatal(err),
        }
    };
    drop(guard);

    match &outcome {
        Outcome::Success => info!("end|"),
        Outcome::Failure(_) => warn!("bad| expectation failed"),
        Outcome::Fatal(err) => warn!(error = %err, "bad| dispatch failed"),
        Outcome::Cancelled => debug!("cancelled|"),
    }
    (outcome, matching.cursor, matching.records_evaluated)
}

/// Handle to a running worker.
#[derive(Debug)]
pub(crate) struct WorkerHandle {
    run_id: RunId,
    cancel: Arc<AtomicBool>,
    rx: Receiver<RunReport>,
    report: Option<RunReport>,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    /// Spawns a worker over an already opened cursor.
    pub(crate) fn spawn(spec: WorkerSpec, cursor: Box<dyn LogCursor>) -> LogExpectResult<Self> {
        let run_id = RunId::new();
        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, rx) = bounded::<RunReport>(1);

        let thread_cancel = Arc::clone(&cancel);
        let thread_name = spec.thread_name.clone();
        let thread = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let span = info_span!("logexpect", session = %spec.session, run = %run_id);
                let _entered = span.enter();
                let started_at = Utc::now();
                let (outcome, cursor, records_evaluated) = run(&spec, &thread_cancel, cursor);
                let _ = tx.send(RunReport {
                    run_id,
                    outcome,
                    cursor,
                    records_evaluated,
                    started_at,
                    finished_at: Utc::now(),
                });
            })
            .map_err(|e| LogExpectError::internal(format!("failed to spawn worker: {e}")))?;

        Ok(Self {
            run_id,
            cancel,
            rx,
            report: None,
            thread,
        })
    }

    pub(crate) const fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Asks the worker to stop at its next suspension point.
    pub(crate) fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// Waits up to `timeout` for the worker's report. Returns true once the
    /// worker has finished.
    pub(crate) fn poll_timeout(&mut self, timeout: Duration) -> bool {
        if self.report.is_some() {
            return true;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(report) => {
                self.report = Some(report);
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => true,
        }
    }

    /// Blocks until the worker exits and returns its report.
    pub(crate) fn join(self) -> LogExpectResult<RunReport> {
        let received = match self.report {
            Some(report) => Ok(report),
            None => self.rx.recv(),
        };
        let joined = self.thread.join();
        match (received, joined) {
            (Ok(report), _) => Ok(report),
            (Err(_), Err(_)) => Err(LogExpectError::internal("worker panicked")),
            (Err(_), Ok(())) => Err(LogExpectError::internal("worker exited without a report")),
        }
    }
}
