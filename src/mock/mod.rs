//! Mock Cluster Implementation
//!
//! In-process stand-ins for the log store and the job status service, with
//! failure injection for testing error paths, plus a manual clock and a
//! capturing sink so monitor runs are deterministic.
//!
//! # Pieces
//!
//! - `MockLogStore`: log groups and streams, paging, delayed delivery
//! - `MockJobService`: scripted job status progressions
//! - `ManualClock`: time that only moves when slept or advanced
//! - `RecordingSink`: keeps forwarded plain-text lines

mod clock;
mod failure;
mod jobs;
mod log_store;
mod sink;
mod state;

pub use clock::ManualClock;
pub use failure::{FailureConfig, FailureInjector, InjectedError, Operation};
pub use jobs::MockJobService;
pub use log_store::MockLogStore;
pub use sink::RecordingSink;
pub use state::{LogState, MockJob, MockStream, StoredRecord};
