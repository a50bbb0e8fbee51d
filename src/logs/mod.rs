//! Log store access
//!
//! A remote job writes to append-only log streams inside one log group.
//! This module defines the records read back from those streams, the
//! [`LogStore`] interface over the backing service, and the deduplicating
//! [`LogTailer`] built on top of it.

mod message;
mod tailer;

pub use message::unwrap_message;
pub use tailer::{Cursor, LogTailer, RecordIdentity, TailError};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the log group a job writes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogGroupRef(String);

impl LogGroupRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogGroupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single record read from a log stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Stream the record was read from
    pub stream: String,

    /// Event time in epoch milliseconds
    pub timestamp: i64,

    /// Raw message text
    pub message: String,

    /// Identifier assigned by the log store, when it provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl LogRecord {
    pub fn new(stream: impl Into<String>, timestamp: i64, message: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            timestamp,
            message: message.into(),
            event_id: None,
        }
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }
}

/// One page of records returned by [`LogStore::read_page`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogPage {
    /// Records in ascending timestamp order
    pub records: Vec<LogRecord>,

    /// Token for the next page, `None` once the query is exhausted
    pub next_token: Option<String>,
}

/// Log store errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum LogStoreError {
    /// The group or stream does not exist (yet)
    #[error("log resource not found: {0}")]
    NotFound(String),

    #[error("log store throttled the request: {0}")]
    Throttled(String),

    #[error("log store request failed: {0}")]
    Transport(String),
}

/// Read access to a log store.
pub trait LogStore: Send + Sync {
    /// List the streams of `group` whose name starts with `prefix`.
    fn list_streams(&self, group: &LogGroupRef, prefix: &str) -> Result<Vec<String>, LogStoreError>;

    /// Read one page of records of `stream` with `timestamp >= start_ms`.
    ///
    /// Pass the `next_token` of the previous page to continue the same query.
    fn read_page(
        &self,
        group: &LogGroupRef,
        stream: &str,
        start_ms: i64,
        next_token: Option<&str>,
    ) -> Result<LogPage, LogStoreError>;
}
