//! In-memory live log.
//!
//! `MemoryLog` is an append-only, thread-safe log that producers write whole
//! transactions to while readers consume it concurrently. It is intended for
//! embedded usage, tests, and as a reference implementation of the
//! [`LogSource`] contract. `MemoryLogs` maps endpoint names to logs.
//!
//! Grouping is decided by the producer: every appended transaction is
//! delivered as one unit, except under [`Grouping::Raw`] where each record
//! becomes its own transaction.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::config::{Grouping, Mode, SourceConfig};
use crate::error::SourceError;
use crate::record::{Origin, RecordView, TransactionView, Vxid};
use crate::tag::Tag;

use super::query::Query;
use super::traits::{BatchHandler, Dispatch, LogCursor, LogSource};

fn lock_err(context: &'static str) -> SourceError {
    SourceError::Backend(format!("poisoned lock: {context}"))
}

/// An owned record, as written by a producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Record kind.
    pub tag: Tag,
    /// Payload bytes.
    pub payload: Vec<u8>,
}

/// An owned transaction, as written by a producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Transaction id stamped on every record.
    pub vxid: Vxid,
    /// Side stamped on every record.
    pub origin: Origin,
    /// Records in append order.
    pub records: Vec<Record>,
}

impl Transaction {
    /// Empty transaction.
    #[must_use]
    pub fn new(vxid: u32, origin: Origin) -> Self {
        Self {
            vxid: Vxid::new(vxid),
            origin,
            records: Vec::new(),
        }
    }

    /// Client-side transaction.
    #[must_use]
    pub fn client(vxid: u32) -> Self {
        Self::new(vxid, Origin::Client)
    }

    /// Backend-side transaction.
    #[must_use]
    pub fn backend(vxid: u32) -> Self {
        Self::new(vxid, Origin::Backend)
    }

    /// Appends a record.
    #[must_use]
    pub fn record(mut self, tag: Tag, payload: impl AsRef<[u8]>) -> Self {
        self.records.push(Record {
            tag,
            payload: payload.as_ref().to_vec(),
        });
        self
    }

    fn views(&self) -> Vec<RecordView<'_>> {
        self.records
            .iter()
            .map(|r| RecordView::new(self.vxid, r.tag, self.origin, &r.payload))
            .collect()
    }
}

#[derive(Debug)]
struct StoredBatch {
    /// Written with `append_batch`; announced by a `Batch` marker.
    explicit: bool,
    transactions: Vec<Transaction>,
}

#[derive(Debug, Default)]
struct LogState {
    batches: VecDeque<StoredBatch>,
    /// Sequence number of `batches[0]`.
    first_seq: u64,
    capacity: Option<usize>,
}

impl LogState {
    fn next_seq(&self) -> u64 {
        self.first_seq + self.batches.len() as u64
    }

    fn push(&mut self, batch: StoredBatch) {
        self.batches.push_back(batch);
        if let Some(cap) = self.capacity {
            while self.batches.len() > cap.max(1) {
                self.batches.pop_front();
                self.first_seq += 1;
            }
        }
    }
}

#[derive(Debug, Default)]
struct LogInner {
    state: RwLock<LogState>,
    readers: AtomicUsize,
}

/// A live, append-only log.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    inner: Arc<LogInner>,
}

impl MemoryLog {
    /// Creates an unbounded log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log retaining at most `batches` batches; slower readers
    /// get [`SourceError::Overrun`].
    #[must_use]
    pub fn with_capacity(batches: usize) -> Self {
        let log = Self::default();
        if let Ok(mut state) = log.inner.state.write() {
            state.capacity = Some(batches);
        }
        log
    }

    /// Appends one transaction as its own batch.
    pub fn append(&self, tx: Transaction) -> Result<(), SourceError> {
        self.push(StoredBatch {
            explicit: false,
            transactions: vec![tx],
        })
    }

    /// Appends several transactions delivered together, preceded by a
    /// `Batch` marker record.
    pub fn append_batch(&self, txs: Vec<Transaction>) -> Result<(), SourceError> {
        self.push(StoredBatch {
            explicit: true,
            transactions: txs,
        })
    }

    fn push(&self, batch: StoredBatch) -> Result<(), SourceError> {
        let mut state = self.inner.state.write().map_err(|_| lock_err("memory_log.append"))?;
        state.push(batch);
        Ok(())
    }

    /// Number of batches currently retained.
    pub fn len(&self) -> Result<usize, SourceError> {
        let state = self.inner.state.read().map_err(|_| lock_err("memory_log.len"))?;
        Ok(state.batches.len())
    }

    /// True if no batch is retained.
    pub fn is_empty(&self) -> Result<bool, SourceError> {
        Ok(self.len()? == 0)
    }

    /// Number of readers opened and not yet closed.
    #[must_use]
    pub fn open_readers(&self) -> usize {
        self.inner.readers.load(Ordering::Acquire)
    }

    /// Opens a reader on this log.
    pub fn reader(&self, config: &SourceConfig) -> Result<MemoryCursor, SourceError> {
        let endpoint = config.endpoint.clone().unwrap_or_default();
        let query = config
            .query
            .as_deref()
            .map(|q| Query::parse(q, config.is_caseless()))
            .transpose()
            .map_err(|e| SourceError::Open {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;

        let position = {
            let state = self.inner.state.read().map_err(|_| lock_err("memory_log.open"))?;
            match config.mode {
                Mode::Head => state.first_seq,
                Mode::Tail => state.next_seq(),
            }
        };

        if let Some(timeout) = config.transaction_timeout {
            debug!(endpoint = %endpoint, ?timeout, "transactions are appended whole; timeout unused");
        }

        self.inner.readers.fetch_add(1, Ordering::AcqRel);
        Ok(MemoryCursor {
            inner: Arc::clone(&self.inner),
            position,
            grouping: config.grouping,
            query,
        })
    }
}

/// Reader over a [`MemoryLog`].
#[derive(Debug)]
pub struct MemoryCursor {
    inner: Arc<LogInner>,
    position: u64,
    grouping: Grouping,
    query: Option<Query>,
}

impl MemoryCursor {
    fn deliver(
        batch: &StoredBatch,
        grouping: Grouping,
        query: Option<&Query>,
        on_batch: &mut BatchHandler<'_>,
    ) -> Dispatch {
        let marker = [RecordView::new(Vxid::new(0), Tag::Batch, Origin::Other, &[])];

        let record_sets: Vec<(Vxid, Vec<RecordView<'_>>)> = match grouping {
            Grouping::Raw => batch
                .transactions
                .iter()
                .flat_map(|tx| tx.views().into_iter().map(|r| (r.vxid, vec![r])))
                .collect(),
            Grouping::Vxid | Grouping::Request | Grouping::Session => batch
                .transactions
                .iter()
                .map(|tx| (tx.vxid, tx.views()))
                .collect(),
        };

        let mut views: Vec<TransactionView<'_>> = Vec::with_capacity(record_sets.len() + 1);
        if batch.explicit {
            views.push(TransactionView::new(Vxid::new(0), &marker));
        }
        views.extend(
            record_sets
                .iter()
                .map(|(vxid, records)| TransactionView::new(*vxid, records))
                .filter(|tx| query.map_or(true, |q| q.matches(tx))),
        );

        on_batch(views.as_slice()).into()
    }
}

impl LogCursor for MemoryCursor {
    fn dispatch(&mut self, on_batch: &mut BatchHandler<'_>) -> Result<Dispatch, SourceError> {
        let state = self.inner.state.read().map_err(|_| lock_err("memory_log.dispatch"))?;
        if self.position < state.first_seq {
            return Err(SourceError::Overrun {
                position: self.position,
                oldest: state.first_seq,
            });
        }

        let offset = usize::try_from(self.position - state.first_seq)
            .map_err(|_| SourceError::Backend("reader position out of range".to_string()))?;
        let Some(batch) = state.batches.get(offset) else {
            return Ok(Dispatch::NoData);
        };

        self.position += 1;
        Ok(Self::deliver(batch, self.grouping, self.query.as_ref(), on_batch))
    }

    fn close(self: Box<Self>) {
        self.inner.readers.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Named logs, addressed by endpoint.
#[derive(Debug, Default)]
pub struct MemoryLogs {
    logs: RwLock<HashMap<String, MemoryLog>>,
}

impl MemoryLogs {
    /// No logs yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the log for `endpoint`, creating it if absent.
    pub fn create(&self, endpoint: &str) -> Result<MemoryLog, SourceError> {
        self.insert(endpoint, MemoryLog::new())
    }

    /// Registers `log` under `endpoint` unless one already exists; returns
    /// the registered log.
    pub fn insert(&self, endpoint: &str, log: MemoryLog) -> Result<MemoryLog, SourceError> {
        let mut logs = self.logs.write().map_err(|_| lock_err("memory_logs.insert"))?;
        Ok(logs.entry(endpoint.to_string()).or_insert(log).clone())
    }

    /// Looks up the log for `endpoint`.
    pub fn get(&self, endpoint: &str) -> Result<Option<MemoryLog>, SourceError> {
        let logs = self.logs.read().map_err(|_| lock_err("memory_logs.get"))?;
        Ok(logs.get(endpoint).cloned())
    }
}

impl LogSource for MemoryLogs {
    fn open(&self, config: &SourceConfig) -> Result<Box<dyn LogCursor>, SourceError> {
        let endpoint = config.endpoint.as_deref().unwrap_or_default();
        let log = self.get(endpoint)?.ok_or_else(|| SourceError::Open {
            endpoint: endpoint.to_string(),
            reason: "no such log".to_string(),
        })?;
        Ok(Box::new(log.reader(config)?))
    }
}
