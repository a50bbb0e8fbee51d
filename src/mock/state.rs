//! Mock Cluster State Management
//!
//! Holds the log groups and job runs behind the mock log store and the mock
//! job service.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};

use crate::job::{JobRunInfo, JobStatus};
use crate::logs::LogRecord;

/// A stored record plus the moment it becomes visible to readers
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub record: LogRecord,
    /// `None` = visible as soon as it is appended
    pub delivered_at: Option<DateTime<Utc>>,
}

impl StoredRecord {
    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        self.delivered_at.map_or(true, |at| now >= at)
    }
}

/// A log stream in the mock store
#[derive(Debug, Clone, Default)]
pub struct MockStream {
    /// Records in ingestion order
    pub records: Vec<StoredRecord>,
    /// When the stream becomes listable (`None` = immediately)
    pub created_at: Option<DateTime<Utc>>,
}

impl MockStream {
    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        self.created_at.map_or(true, |at| now >= at)
    }
}

/// Log groups by name, streams by name
#[derive(Debug, Default)]
pub struct LogState {
    pub groups: BTreeMap<String, BTreeMap<String, MockStream>>,
    event_counter: u64,
}

impl LogState {
    /// Create a new empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a store-assigned event identifier
    pub fn next_event_id(&mut self) -> String {
        self.event_counter += 1;
        format!("evt-{:016x}", self.event_counter)
    }

    /// Create a group if it does not exist
    pub fn create_group(&mut self, group: &str) {
        self.groups.entry(group.to_string()).or_default();
    }

    /// Get a stream, creating it (and its group) when missing
    pub fn stream_mut(&mut self, group: &str, stream: &str) -> &mut MockStream {
        self.groups
            .entry(group.to_string())
            .or_default()
            .entry(stream.to_string())
            .or_default()
    }

    /// Get a stream
    pub fn stream(&self, group: &str, stream: &str) -> Option<&MockStream> {
        self.groups.get(group).and_then(|streams| streams.get(stream))
    }
}

/// A job run in the mock job service
#[derive(Debug, Clone)]
pub struct MockJob {
    /// Status returned by the most recent describe
    pub current: JobRunInfo,
    /// Statuses returned by upcoming describes, in order
    pub script: VecDeque<JobRunInfo>,
    /// Number of describe calls served
    pub describe_calls: u32,
}

impl MockJob {
    /// Create a job that reports `statuses` one describe at a time and then
    /// keeps reporting the last one
    pub fn scripted(job_id: &str, statuses: &[JobStatus]) -> Self {
        let mut script: VecDeque<JobRunInfo> = statuses
            .iter()
            .map(|status| JobRunInfo::new(job_id, *status))
            .collect();
        let current = script
            .pop_front()
            .unwrap_or_else(|| JobRunInfo::new(job_id, JobStatus::Pending));
        script.push_front(current.clone());

        Self {
            current,
            script,
            describe_calls: 0,
        }
    }

    /// Serve one describe call
    pub fn describe(&mut self) -> JobRunInfo {
        self.describe_calls += 1;
        if let Some(next) = self.script.pop_front() {
            self.current = next;
        }
        self.current.clone()
    }
}
