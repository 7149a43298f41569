//! Borrowed views of log records and transactions.
//!
//! A log source lends these views to the dispatch callback only for the
//! duration of one invocation. Anything that must outlive the call is copied
//! out: the scalar identifiers, or formatted text.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tag::Tag;

/// Transaction identifier carried by every record of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vxid(u32);

impl Vxid {
    /// Wraps a raw transaction id.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw numeric value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Vxid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of the proxy produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Client side.
    Client,
    /// Backend side.
    Backend,
    /// Neither, e.g. CLI or expiry records.
    Other,
}

impl Origin {
    /// Single-character marker used in transcripts.
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Self::Client => 'c',
            Self::Backend => 'b',
            Self::Other => '-',
        }
    }
}

/// One log record, borrowed from the source's buffer.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    /// Transaction the record belongs to.
    pub vxid: Vxid,
    /// Record kind.
    pub tag: Tag,
    /// Producing side.
    pub origin: Origin,
    /// Raw payload bytes.
    pub payload: &'a [u8],
}

impl<'a> RecordView<'a> {
    /// Borrows a record.
    #[must_use]
    pub const fn new(vxid: Vxid, tag: Tag, origin: Origin, payload: &'a [u8]) -> Self {
        Self {
            vxid,
            tag,
            origin,
            payload,
        }
    }

    /// Copies out at most `limit` bytes of the payload as text.
    #[must_use]
    pub fn excerpt(&self, limit: usize) -> String {
        let end = self.payload.len().min(limit);
        let mut text = String::from_utf8_lossy(&self.payload[..end]).into_owned();
        if end < self.payload.len() {
            text.push_str("...");
        }
        text
    }
}

/// An ordered group of records sharing a grouping key.
#[derive(Debug, Clone, Copy)]
pub struct TransactionView<'a> {
    /// Grouping key.
    pub vxid: Vxid,
    /// Records in log order.
    pub records: &'a [RecordView<'a>],
}

impl<'a> TransactionView<'a> {
    /// Borrows a transaction.
    #[must_use]
    pub const fn new(vxid: Vxid, records: &'a [RecordView<'a>]) -> Self {
        Self { vxid, records }
    }
}
