//! jobwatch - remote job run monitor
//!
//! Watches a job running on a managed compute cluster by polling its status
//! and tailing its log streams, decodes the structured events the job writes
//! into its logs, and hands them to the caller as one ordered sequence.

pub mod backend;
pub mod config;
pub mod job;
pub mod logs;
pub mod mock;
pub mod monitor;

pub use job::{JobRunInfo, JobStatus, JobStatusSource, StatusError};
pub use logs::{LogGroupRef, LogPage, LogRecord, LogStore, LogStoreError, LogTailer, TailError};
pub use monitor::{
    BackoffPolicy, Clock, JobRunMonitor, LogSink, MonitorConfig, MonitorError, MonitorState,
    MonitorSummary, SystemClock,
};

pub use jobwatch_protocol as protocol;
pub use jobwatch_protocol::{DecodeError, DomainEvent, EncodeError, EventKind, EventPayload};
