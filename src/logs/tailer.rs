//! Incremental, deduplicating log tailer
//!
//! Log stores have no API to stream new records, so the tailer repeatedly
//! queries every stream matching a name prefix from that stream's last seen
//! timestamp onwards. The lower bound is inclusive, so records at the last
//! timestamp come back on every query; they are told apart by identity.
//!
//! ## Cursor rules
//!
//! - `timestamp > last_timestamp`: new
//! - `timestamp == last_timestamp`: new unless its identity was already seen
//! - the seen set only ever holds identities at `last_timestamp`
//!
//! Streams are queried one by one so that a stream lagging behind another
//! never loses records to a shared high-water mark.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use super::{LogGroupRef, LogRecord, LogStore, LogStoreError};

/// Identity of a record, used to break timestamp ties.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordIdentity {
    /// Identifier assigned by the log store
    EventId(String),
    /// Content digest plus the position among identical records at the same
    /// timestamp, for stores without event identifiers
    Content { digest: String, ordinal: u32 },
}

impl RecordIdentity {
    fn of(record: &LogRecord, ordinals: &mut HashMap<(i64, String), u32>) -> Self {
        if let Some(id) = &record.event_id {
            return RecordIdentity::EventId(id.clone());
        }

        let digest = hex::encode(Sha256::digest(record.message.as_bytes()));
        let ordinal = ordinals.entry((record.timestamp, digest.clone())).or_insert(0);
        let identity = RecordIdentity::Content {
            digest,
            ordinal: *ordinal,
        };
        *ordinal += 1;
        identity
    }
}

/// Read position within one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    last_timestamp: i64,
    seen_at_last_timestamp: HashSet<RecordIdentity>,
}

impl Cursor {
    /// Cursor for a stream nothing has been read from yet.
    pub fn new(start_timestamp: i64) -> Self {
        Self {
            last_timestamp: start_timestamp,
            seen_at_last_timestamp: HashSet::new(),
        }
    }

    /// Last timestamp for which a record was returned (or the start bound).
    pub fn last_timestamp(&self) -> i64 {
        self.last_timestamp
    }

    /// Identities already returned at [`Cursor::last_timestamp`].
    pub fn seen_at_last_timestamp(&self) -> &HashSet<RecordIdentity> {
        &self.seen_at_last_timestamp
    }

    /// Classify the result of a query started at `last_timestamp`.
    ///
    /// Returns the cursor to use after these records and the records not
    /// returned before. `self` is left untouched so the caller decides when
    /// to commit.
    pub fn classify(&self, mut records: Vec<LogRecord>) -> (Cursor, Vec<LogRecord>) {
        // Stable: equal timestamps keep store order, which keeps ordinals stable
        records.sort_by_key(|record| record.timestamp);

        let mut ordinals = HashMap::new();
        let mut identities = Vec::with_capacity(records.len());
        let mut fresh = Vec::new();
        let mut max_timestamp = self.last_timestamp;

        for record in records {
            if record.timestamp < self.last_timestamp {
                continue;
            }

            let identity = RecordIdentity::of(&record, &mut ordinals);
            let is_new = record.timestamp > self.last_timestamp
                || !self.seen_at_last_timestamp.contains(&identity);

            max_timestamp = max_timestamp.max(record.timestamp);
            identities.push((record.timestamp, identity));
            if is_new {
                fresh.push(record);
            }
        }

        if fresh.is_empty() {
            return (self.clone(), fresh);
        }

        let seen = identities
            .into_iter()
            .filter(|(timestamp, _)| *timestamp == max_timestamp)
            .map(|(_, identity)| identity)
            .collect();

        (
            Cursor {
                last_timestamp: max_timestamp,
                seen_at_last_timestamp: seen,
            },
            fresh,
        )
    }
}

/// Errors while tailing. All of them are transient from the tailer's point
/// of view: calling [`LogTailer::fetch_events`] again retries.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TailError {
    #[error("listing streams of log group {group} failed: {source}")]
    ListStreams {
        group: String,
        #[source]
        source: LogStoreError,
    },

    #[error("reading log stream {stream} failed: {source}")]
    ReadStream {
        stream: String,
        #[source]
        source: LogStoreError,
    },
}

impl TailError {
    /// Whether calling again may succeed.
    pub fn is_retryable(&self) -> bool {
        true
    }

    /// Underlying log store error.
    pub fn store_error(&self) -> &LogStoreError {
        match self {
            TailError::ListStreams { source, .. } | TailError::ReadStream { source, .. } => source,
        }
    }
}

/// Tails every stream of a log group whose name starts with a prefix.
///
/// Each call to [`LogTailer::fetch_events`] returns only records this
/// instance has not returned before. State cannot be rewound; build a new
/// tailer to start over.
pub struct LogTailer {
    store: Arc<dyn LogStore>,
    group: LogGroupRef,
    prefix: String,
    start_timestamp: i64,
    cursors: BTreeMap<String, Cursor>,
}

impl LogTailer {
    /// Create a tailer returning records with `timestamp >= start_timestamp`.
    pub fn new(
        store: Arc<dyn LogStore>,
        group: LogGroupRef,
        prefix: impl Into<String>,
        start_timestamp: i64,
    ) -> Self {
        Self {
            store,
            group,
            prefix: prefix.into(),
            start_timestamp,
            cursors: BTreeMap::new(),
        }
    }

    pub fn group(&self) -> &LogGroupRef {
        &self.group
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Streams discovered so far, in name order.
    pub fn streams(&self) -> impl Iterator<Item = &str> {
        self.cursors.keys().map(String::as_str)
    }

    /// Cursor of a known stream.
    pub fn cursor(&self, stream: &str) -> Option<&Cursor> {
        self.cursors.get(stream)
    }

    /// Stream name relative to the prefix (`job-1/stdout` -> `stdout`).
    pub fn relative_stream_name<'a>(&self, stream: &'a str) -> &'a str {
        stream.strip_prefix(self.prefix.as_str()).unwrap_or(stream)
    }

    /// Look for streams created since the last call.
    ///
    /// Returns the names of the newly found streams. A missing log group is
    /// not an error: it simply has no streams yet.
    pub fn discover_streams(&mut self) -> Result<Vec<String>, TailError> {
        let listed = match self.store.list_streams(&self.group, &self.prefix) {
            Ok(streams) => streams,
            Err(LogStoreError::NotFound(_)) => Vec::new(),
            Err(source) => {
                return Err(TailError::ListStreams {
                    group: self.group.name().to_string(),
                    source,
                })
            }
        };

        let mut discovered = Vec::new();
        for stream in listed {
            if !stream.starts_with(&self.prefix) || self.cursors.contains_key(&stream) {
                continue;
            }
            tracing::info!(group = %self.group, stream = %stream, "Tailing new log stream");
            self.cursors
                .insert(stream.clone(), Cursor::new(self.start_timestamp));
            discovered.push(stream);
        }

        Ok(discovered)
    }

    /// Fetch records not returned by a previous call.
    ///
    /// Records are in ascending timestamp order within each stream; streams
    /// follow each other in name order. On error no cursor moves, so the next
    /// call returns everything this one would have.
    pub fn fetch_events(&mut self) -> Result<Vec<LogRecord>, TailError> {
        self.discover_streams()?;

        let mut staged = Vec::with_capacity(self.cursors.len());
        let mut fresh = Vec::new();

        for (stream, cursor) in &self.cursors {
            let records = self.read_stream(stream, cursor.last_timestamp())?;
            let fetched = records.len();
            let (next, new_records) = cursor.classify(records);

            tracing::debug!(
                stream = %stream,
                fetched,
                new = new_records.len(),
                last_timestamp = next.last_timestamp(),
                "Fetched log records"
            );

            staged.push((stream.clone(), next));
            fresh.extend(new_records);
        }

        for (stream, cursor) in staged {
            self.cursors.insert(stream, cursor);
        }

        Ok(fresh)
    }

    /// Read every page of one stream starting at `start_ms` (inclusive).
    fn read_stream(&self, stream: &str, start_ms: i64) -> Result<Vec<LogRecord>, TailError> {
        let mut records = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let page = match self
                .store
                .read_page(&self.group, stream, start_ms, next_token.as_deref())
            {
                Ok(page) => page,
                Err(LogStoreError::NotFound(_)) => break,
                Err(source) => {
                    return Err(TailError::ReadStream {
                        stream: stream.to_string(),
                        source,
                    })
                }
            };

            records.extend(page.records);

            match page.next_token {
                Some(token) if next_token.as_deref() != Some(token.as_str()) => {
                    next_token = Some(token)
                }
                _ => break,
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FailureConfig, MockLogStore, Operation};

    fn record(ts: i64, message: &str) -> LogRecord {
        LogRecord::new("s", ts, message)
    }

    fn tailer(store: &Arc<MockLogStore>, prefix: &str, start: i64) -> LogTailer {
        LogTailer::new(store.clone(), LogGroupRef::new("g"), prefix, start)
    }

    #[test]
    fn test_cursor_new_records_advance() {
        let cursor = Cursor::new(100);
        let (next, fresh) = cursor.classify(vec![record(150, "a"), record(120, "b")]);

        assert_eq!(fresh.len(), 2);
        assert_eq!(fresh[0].timestamp, 120, "sorted ascending");
        assert_eq!(next.last_timestamp(), 150);
        assert_eq!(next.seen_at_last_timestamp().len(), 1);
    }

    #[test]
    fn test_cursor_ignores_seen_tie() {
        let cursor = Cursor::new(100);
        let (next, _) = cursor.classify(vec![record(150, "a")]);

        let (again, fresh) = next.classify(vec![record(150, "a")]);
        assert!(fresh.is_empty());
        assert_eq!(again, next);
    }

    #[test]
    fn test_cursor_new_record_at_same_timestamp() {
        let cursor = Cursor::new(100);
        let (next, _) = cursor.classify(vec![record(150, "a")]);

        let (after, fresh) = next.classify(vec![record(150, "a"), record(150, "b")]);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].message, "b");
        assert_eq!(after.last_timestamp(), 150);
        assert_eq!(after.seen_at_last_timestamp().len(), 2);
    }

    #[test]
    fn test_cursor_identical_lines_counted_by_position() {
        let cursor = Cursor::new(0);
        let (next, fresh) = cursor.classify(vec![record(10, "same"), record(10, "same")]);
        assert_eq!(fresh.len(), 2);

        // A third identical line at the same timestamp is still new
        let (_, fresh) = next.classify(vec![
            record(10, "same"),
            record(10, "same"),
            record(10, "same"),
        ]);
        assert_eq!(fresh.len(), 1);
    }

    #[test]
    fn test_cursor_prefers_event_ids() {
        let cursor = Cursor::new(0);
        let a = record(10, "same").with_event_id("e1");
        let b = record(10, "same").with_event_id("e2");
        let (next, fresh) = cursor.classify(vec![a.clone()]);
        assert_eq!(fresh.len(), 1);

        let (_, fresh) = next.classify(vec![b, a]);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].event_id.as_deref(), Some("e2"));
    }

    #[test]
    fn test_cursor_drops_identities_when_timestamp_advances() {
        let cursor = Cursor::new(0);
        let (next, _) = cursor.classify(vec![record(10, "a"), record(10, "b")]);
        let (after, _) = next.classify(vec![record(10, "a"), record(10, "b"), record(20, "c")]);

        assert_eq!(after.last_timestamp(), 20);
        assert_eq!(after.seen_at_last_timestamp().len(), 1);
    }

    #[test]
    fn test_cursor_ignores_records_before_bound() {
        let cursor = Cursor::new(100);
        let (next, fresh) = cursor.classify(vec![record(50, "old")]);
        assert!(fresh.is_empty());
        assert_eq!(next.last_timestamp(), 100);
    }

    #[test]
    fn test_missing_group_is_empty() {
        let store = Arc::new(MockLogStore::new());
        let mut tailer = tailer(&store, "s", 0);

        assert!(tailer.fetch_events().unwrap().is_empty());
        assert_eq!(tailer.streams().count(), 0);
    }

    #[test]
    fn test_prefix_selects_streams() {
        let store = Arc::new(MockLogStore::new());
        store.put("g", "job-1/stdout", 10, "out");
        store.put("g", "job-1/stderr", 10, "err");
        store.put("g", "job-2/stdout", 10, "other job");

        let mut tailer = tailer(&store, "job-1/", 0);
        let records = tailer.fetch_events().unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(
            tailer.streams().collect::<Vec<_>>(),
            vec!["job-1/stderr", "job-1/stdout"]
        );
        assert_eq!(tailer.relative_stream_name("job-1/stderr"), "stderr");
    }

    #[test]
    fn test_start_timestamp_bounds_records() {
        let store = Arc::new(MockLogStore::new());
        store.put("g", "s1", 100, "before");
        store.put("g", "s1", 600, "after");

        let mut tailer = tailer(&store, "s", 500);
        let records = tailer.fetch_events().unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "after");
    }

    #[test]
    fn test_pagination_is_exhausted() {
        let store = Arc::new(MockLogStore::new().with_page_size(2));
        for i in 0..7 {
            store.put("g", "s1", 10 + i, &format!("line {}", i));
        }

        let mut tailer = tailer(&store, "s", 0);
        let records = tailer.fetch_events().unwrap();

        assert_eq!(records.len(), 7);
        assert!(records.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(tailer.fetch_events().unwrap().is_empty());
    }

    #[test]
    fn test_failed_fetch_moves_no_cursor() {
        let store = Arc::new(MockLogStore::new());
        store.put("g", "s1", 10, "a");
        store.put("g", "s2", 10, "b");

        let mut tailer = tailer(&store, "s", 0);
        store.inject(
            Operation::ReadPage,
            FailureConfig::throttled().with_fail_count(1),
        );

        let err = tailer.fetch_events().unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err.store_error(), LogStoreError::Throttled(_)));
        assert_eq!(tailer.cursor("s1").unwrap().last_timestamp(), 0);

        // Retry delivers everything exactly once
        assert_eq!(tailer.fetch_events().unwrap().len(), 2);
        assert!(tailer.fetch_events().unwrap().is_empty());
    }

    #[test]
    fn test_list_failure_is_retryable() {
        let store = Arc::new(MockLogStore::new());
        store.put("g", "s1", 10, "a");
        store.inject(
            Operation::ListStreams,
            FailureConfig::transport("connection reset").with_fail_count(1),
        );

        let mut tailer = tailer(&store, "s", 0);
        assert!(matches!(
            tailer.fetch_events().unwrap_err(),
            TailError::ListStreams { .. }
        ));
        assert_eq!(tailer.fetch_events().unwrap().len(), 1);
    }
}
