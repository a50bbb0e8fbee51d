//! In-memory log store

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::logs::{LogGroupRef, LogPage, LogRecord, LogStore, LogStoreError};
use crate::monitor::Clock;

use super::failure::{FailureConfig, FailureInjector, Operation};
use super::state::{LogState, StoredRecord};

/// In-memory log store with paging and failure injection.
///
/// Records appended with a delivery time only become readable once the
/// attached clock reaches it, which models the shipping delay between a job
/// writing a line and the line showing up in the store.
pub struct MockLogStore {
    state: Mutex<LogState>,
    failures: Mutex<FailureInjector>,
    clock: Option<Arc<dyn Clock>>,
    page_size: usize,
    assign_event_ids: bool,
    read_calls: Mutex<u32>,
}

impl Default for MockLogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLogStore {
    /// Create an empty store with store-assigned event ids
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LogState::new()),
            failures: Mutex::new(FailureInjector::new()),
            clock: None,
            page_size: 100,
            assign_event_ids: true,
            read_calls: Mutex::new(0),
        }
    }

    /// Limit the number of records per page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Leave records without event ids, like stores that do not expose them
    pub fn without_event_ids(mut self) -> Self {
        self.assign_event_ids = false;
        self
    }

    /// Gate delayed records on `clock`
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    fn state(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.as_ref().map_or_else(Utc::now, |clock| clock.now())
    }

    // === Public API for test configuration ===

    /// Create an empty log group
    pub fn create_group(&self, group: &str) {
        self.state().create_group(group);
    }

    /// Create an empty stream (and its group)
    pub fn create_stream(&self, group: &str, stream: &str) {
        self.state().stream_mut(group, stream);
    }

    /// Append a record that is readable immediately
    pub fn put(&self, group: &str, stream: &str, timestamp: i64, message: &str) -> LogRecord {
        self.append(group, stream, timestamp, message, None)
    }

    /// Append a record that becomes readable at `delivered_at`
    ///
    /// A stream created this way is not listed before its first delivery.
    pub fn put_delivered_at(
        &self,
        group: &str,
        stream: &str,
        timestamp: i64,
        message: &str,
        delivered_at: DateTime<Utc>,
    ) -> LogRecord {
        self.append(group, stream, timestamp, message, Some(delivered_at))
    }

    fn append(
        &self,
        group: &str,
        stream: &str,
        timestamp: i64,
        message: &str,
        delivered_at: Option<DateTime<Utc>>,
    ) -> LogRecord {
        let mut state = self.state();
        let mut record = LogRecord::new(stream, timestamp, message);
        if self.assign_event_ids {
            record.event_id = Some(state.next_event_id());
        }

        let is_new = state.stream(group, stream).is_none();
        let entry = state.stream_mut(group, stream);
        if is_new {
            entry.created_at = delivered_at;
        }
        entry.records.push(StoredRecord {
            record: record.clone(),
            delivered_at,
        });
        record
    }

    /// Inject a failure for an operation
    pub fn inject(&self, op: Operation, config: FailureConfig) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .inject(op, config);
    }

    /// Clear all failure injections
    pub fn clear_failures(&self) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of `read_page` calls served (including failed ones)
    pub fn read_calls(&self) -> u32 {
        *self.read_calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_failure(&self, op: Operation) -> Result<(), LogStoreError> {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        match failures.check(op) {
            Some(config) => Err(config.log_store_error()),
            None => Ok(()),
        }
    }
}

impl LogStore for MockLogStore {
    fn list_streams(&self, group: &LogGroupRef, prefix: &str) -> Result<Vec<String>, LogStoreError> {
        self.check_failure(Operation::ListStreams)?;

        let now = self.now();
        let state = self.state();
        let streams = state
            .groups
            .get(group.name())
            .ok_or_else(|| LogStoreError::NotFound(format!("log group {}", group)))?;

        Ok(streams
            .iter()
            .filter(|(name, stream)| name.starts_with(prefix) && stream.is_visible(now))
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn read_page(
        &self,
        group: &LogGroupRef,
        stream: &str,
        start_ms: i64,
        next_token: Option<&str>,
    ) -> Result<LogPage, LogStoreError> {
        *self.read_calls.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        self.check_failure(Operation::ReadPage)?;

        let offset = match next_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| LogStoreError::Transport(format!("invalid next token: {}", token)))?,
            None => 0,
        };

        let now = self.now();
        let state = self.state();
        let stored = state
            .stream(group.name(), stream)
            .ok_or_else(|| LogStoreError::NotFound(format!("log stream {}/{}", group, stream)))?;

        let mut matching: Vec<&LogRecord> = stored
            .records
            .iter()
            .filter(|stored| stored.is_visible(now) && stored.record.timestamp >= start_ms)
            .map(|stored| &stored.record)
            .collect();
        matching.sort_by_key(|record| record.timestamp);

        let records: Vec<LogRecord> = matching
            .iter()
            .skip(offset)
            .take(self.page_size)
            .map(|record| (*record).clone())
            .collect();

        let consumed = offset + records.len();
        let next_token = (consumed < matching.len()).then(|| consumed.to_string());

        Ok(LogPage {
            records,
            next_token,
        })
    }
}
