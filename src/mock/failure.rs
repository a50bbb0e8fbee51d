//! Failure Injection for the Mock Cluster
//!
//! Makes chosen store or status calls fail, forever or for the first N calls.

use std::collections::HashMap;

use crate::job::StatusError;
use crate::logs::LogStoreError;

/// Operations of the mock cluster that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `LogStore::list_streams`
    ListStreams,
    /// `LogStore::read_page`
    ReadPage,
    /// `JobStatusSource::describe_job`
    DescribeJob,
}

/// Kind of injected failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedError {
    Throttled,
    Transport,
    NotFound,
}

/// What an injected failure looks like
#[derive(Debug, Clone)]
pub struct FailureConfig {
    pub error: InjectedError,
    pub message: String,
    /// Calls that fail before the operation recovers; `None` never recovers
    pub fail_count: Option<u32>,
}

impl FailureConfig {
    /// Create a throttling error
    pub fn throttled() -> Self {
        Self {
            error: InjectedError::Throttled,
            message: "Rate exceeded".to_string(),
            fail_count: None,
        }
    }

    /// Create a network-level error
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            error: InjectedError::Transport,
            message: message.into(),
            fail_count: None,
        }
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            error: InjectedError::NotFound,
            message: message.into(),
            fail_count: None,
        }
    }

    /// Recover after `count` failed calls
    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }

    /// The failure as a log store error
    pub fn log_store_error(&self) -> LogStoreError {
        match self.error {
            InjectedError::Throttled => LogStoreError::Throttled(self.message.clone()),
            InjectedError::Transport => LogStoreError::Transport(self.message.clone()),
            InjectedError::NotFound => LogStoreError::NotFound(self.message.clone()),
        }
    }

    /// The failure as a job status error
    pub fn status_error(&self, job_id: &str) -> StatusError {
        match self.error {
            InjectedError::NotFound => StatusError::UnknownJob(job_id.to_string()),
            InjectedError::Throttled | InjectedError::Transport => {
                StatusError::Transient(self.message.clone())
            }
        }
    }
}

/// Per-operation failure table with call counting
#[derive(Debug, Default)]
pub struct FailureInjector {
    configs: HashMap<Operation, FailureConfig>,
    call_counts: HashMap<Operation, u32>,
}

impl FailureInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any earlier failure for `op` and restarts its count
    pub fn inject(&mut self, op: Operation, config: FailureConfig) {
        self.configs.insert(op, config);
        self.call_counts.insert(op, 0);
    }

    pub fn clear(&mut self) {
        self.configs.clear();
        self.call_counts.clear();
    }

    /// Counts one call to `op` and returns the failure it should see, if any
    pub fn check(&mut self, op: Operation) -> Option<&FailureConfig> {
        let config = self.configs.get(&op)?;
        let count = self.call_counts.entry(op).or_insert(0);
        *count += 1;

        match config.fail_count {
            Some(limit) if *count > limit => None,
            _ => Some(config),
        }
    }
}
