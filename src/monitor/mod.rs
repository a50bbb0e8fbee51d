//! Job run monitor
//!
//! Polls a remote job's status and tails its logs until the job is done and
//! the trailing logs have had time to arrive. Decoded events are handed out
//! through an [`Iterator`]; ordinary log lines go to a [`LogSink`].
//!
//! ## States
//!
//! ```text
//! POLLING ──terminal status──▶ DRAINING(deadline) ──now >= deadline──▶ DONE
//! ```
//!
//! A tick queries the status, fetches new records, decodes event lines, and
//! then checks the drain deadline. Logs keep being fetched for at least
//! `max_wait_after_done` after the terminal status was first observed,
//! because log shipping lags behind the job itself.
//!
//! Transient failures are yielded as `Err` items and monitoring continues.
//! An unknown job or the overall timeout is yielded once and ends the
//! sequence.

pub(crate) mod clock;
mod config;
mod sink;
mod summary;
mod timeout;

pub use clock::{Clock, SystemClock};
pub use config::{BackoffPolicy, MonitorConfig, DEFAULT_MAX_WAIT_AFTER_DONE, DEFAULT_POLL_INTERVAL};
pub use sink::{LogSink, NullSink, StdioSink, TracingSink};
pub use summary::{MonitorCounters, MonitorSummary, SUMMARY_SCHEMA_ID, SUMMARY_SCHEMA_VERSION};
pub use timeout::{TimeoutEnforcer, TimeoutStatus};

use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jobwatch_protocol::{decode, DomainEvent};

use crate::job::{JobRunInfo, JobStatus, JobStatusSource, StatusError};
use crate::logs::{unwrap_message, LogRecord, LogStore, LogTailer, TailError};

/// Where the monitor is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Job not finished yet
    Polling,
    /// Job finished; logs are tailed until `deadline`
    Draining { deadline: DateTime<Utc> },
    /// No further ticks
    Done,
}

impl MonitorState {
    pub fn is_done(&self) -> bool {
        matches!(self, MonitorState::Done)
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorState::Polling => write!(f, "POLLING"),
            MonitorState::Draining { deadline } => write!(f, "DRAINING(until {})", deadline),
            MonitorState::Done => write!(f, "DONE"),
        }
    }
}

/// Errors yielded by the monitor
#[derive(Debug, Clone, thiserror::Error)]
pub enum MonitorError {
    /// Status query failed; the next tick tries again
    #[error(transparent)]
    StatusQuery(StatusError),

    /// Log fetch failed; no cursor moved and the next tick tries again
    #[error(transparent)]
    LogFetch(#[from] TailError),

    /// The cluster does not know the job; monitoring stops
    #[error("unknown job id: {0}")]
    UnknownJob(String),

    /// Overall time limit hit; monitoring stops
    #[error("monitoring timed out after {0:?}")]
    Timeout(Duration),
}

impl MonitorError {
    /// Whether monitoring continues after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, MonitorError::StatusQuery(_) | MonitorError::LogFetch(_))
    }
}

impl From<StatusError> for MonitorError {
    fn from(err: StatusError) -> Self {
        match err {
            StatusError::UnknownJob(job_id) => MonitorError::UnknownJob(job_id),
            transient @ StatusError::Transient(_) => MonitorError::StatusQuery(transient),
        }
    }
}

/// Watches one job run.
///
/// Each `next()` call runs as many ticks as needed to produce an item,
/// sleeping on the clock between ticks. The iterator ends once the drain
/// window closed and every decoded event was handed out.
pub struct JobRunMonitor {
    config: MonitorConfig,
    jobs: Arc<dyn JobStatusSource>,
    tailer: LogTailer,
    clock: Arc<dyn Clock>,
    sink: Box<dyn LogSink>,
    timeout: TimeoutEnforcer,
    state: MonitorState,
    pending: VecDeque<DomainEvent>,
    sleep_before_tick: bool,
    consecutive_errors: u32,
    job_run: Option<JobRunInfo>,
    terminal_run: Option<JobRunInfo>,
    final_event_seen: bool,
    fatal: Option<MonitorError>,
    finished_at: Option<DateTime<Utc>>,
    counters: MonitorCounters,
    span: tracing::Span,
}

impl JobRunMonitor {
    /// Monitor with the system clock, forwarding plain lines to stdout/stderr.
    pub fn new(
        config: MonitorConfig,
        jobs: Arc<dyn JobStatusSource>,
        logs: Arc<dyn LogStore>,
    ) -> Self {
        let tailer = LogTailer::new(
            logs,
            config.log_group.clone(),
            config.stream_prefix.clone(),
            config.start_timestamp_ms,
        );
        let span = tracing::info_span!("monitor", job_id = %config.job_id);
        Self {
            timeout: TimeoutEnforcer::new(config.overall_timeout),
            config,
            jobs,
            tailer,
            clock: Arc::new(SystemClock),
            sink: Box::new(StdioSink),
            state: MonitorState::Polling,
            pending: VecDeque::new(),
            sleep_before_tick: false,
            consecutive_errors: 0,
            job_run: None,
            terminal_run: None,
            final_event_seen: false,
            fatal: None,
            finished_at: None,
            counters: MonitorCounters::default(),
            span,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sink(mut self, sink: impl LogSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn tailer(&self) -> &LogTailer {
        &self.tailer
    }

    /// Most recent status answer
    pub fn job_run(&self) -> Option<&JobRunInfo> {
        self.job_run.as_ref()
    }

    /// Terminal status, once observed.
    ///
    /// A fatal error does not clear it: after an unknown job it is `None`
    /// because no status was ever seen, and after a timeout inside the drain
    /// window it still holds the status that started the drain.
    pub fn final_status(&self) -> Option<JobStatus> {
        self.terminal_run.as_ref().map(|run| run.status)
    }

    /// Status answer that carried the terminal status
    pub fn terminal_run(&self) -> Option<&JobRunInfo> {
        self.terminal_run.as_ref()
    }

    /// Error that ended monitoring early
    pub fn fatal_error(&self) -> Option<&MonitorError> {
        self.fatal.as_ref()
    }

    pub fn counters(&self) -> MonitorCounters {
        self.counters
    }

    /// Snapshot of the run so far
    pub fn summary(&self) -> MonitorSummary {
        let final_status = self.final_status();
        let error = self.fatal.as_ref().map(|err| err.to_string());
        let human_summary = MonitorSummary::describe(
            &self.config.job_id,
            final_status,
            error.as_deref(),
            &self.counters,
        );

        MonitorSummary {
            schema_version: SUMMARY_SCHEMA_VERSION,
            schema_id: SUMMARY_SCHEMA_ID.to_string(),
            job_id: self.config.job_id.clone(),
            log_group: self.config.log_group.name().to_string(),
            stream_prefix: self.config.stream_prefix.clone(),
            started_at: self.timeout.started_at(),
            finished_at: self.finished_at,
            final_status,
            failure_reason: self
                .terminal_run
                .as_ref()
                .and_then(|run| run.failure_reason.clone()),
            error,
            streams: self.tailer.streams().map(str::to_string).collect(),
            counters: self.counters,
            human_summary,
        }
    }

    /// One pass: status, logs, drain check.
    fn tick(&mut self) -> Result<(), MonitorError> {
        let now = self.clock.now();
        self.timeout.start(now);
        self.counters.ticks += 1;

        if self.timeout.check(now).is_timeout() {
            let limit = self.timeout.limit().unwrap_or_default();
            return Err(self.abort(MonitorError::Timeout(limit)));
        }

        let info = match self.jobs.describe_job(&self.config.job_id) {
            Ok(info) => info,
            Err(err) => {
                let err = MonitorError::from(err);
                if err.is_retryable() {
                    return Err(self.transient(err));
                }
                return Err(self.abort(err));
            }
        };
        self.observe_status(info, now);

        let records = match self.tailer.fetch_events() {
            Ok(records) => records,
            Err(err) => return Err(self.transient(err.into())),
        };
        self.consecutive_errors = 0;
        self.counters.records_fetched += records.len() as u64;
        tracing::debug!(state = %self.state, records = records.len(), "Polled job run");

        for record in records {
            self.handle_record(record);
        }

        self.check_drain();
        self.sleep_before_tick = true;
        Ok(())
    }

    fn observe_status(&mut self, info: JobRunInfo, now: DateTime<Utc>) {
        let previous = self.job_run.as_ref().map(|run| run.status);
        if previous != Some(info.status) {
            tracing::info!(status = %info.status, "Job status changed");
        }

        if self.state == MonitorState::Polling && info.status.is_terminal() {
            let deadline = now + clock::to_chrono(self.config.max_wait_after_done);
            if let Some(reason) = &info.failure_reason {
                tracing::warn!(status = %info.status, reason = %reason, "Job did not succeed");
            }
            tracing::info!(
                status = %info.status,
                deadline = %deadline,
                "Job finished; draining remaining logs"
            );
            self.state = MonitorState::Draining { deadline };
            self.terminal_run = Some(info.clone());
        }

        self.job_run = Some(info);
    }

    fn handle_record(&mut self, record: LogRecord) {
        let line = if self.config.unwrap_json_messages {
            unwrap_message(&record.message)
        } else {
            Cow::Borrowed(record.message.as_str())
        };
        let stream = self.tailer.relative_stream_name(&record.stream);

        match decode(&line) {
            Ok(Some(event)) => {
                tracing::debug!(stream, kind = %event.kind(), "Decoded event");
                self.counters.events_decoded += 1;
                if event.is_final() {
                    self.final_event_seen = true;
                }
                self.pending.push_back(event);
            }
            Ok(None) => self.sink.write_line(stream, &line),
            Err(err) => {
                self.counters.decode_errors += 1;
                tracing::warn!(
                    stream,
                    timestamp = record.timestamp,
                    error = %err,
                    "Skipping malformed event line"
                );
                self.sink.write_line(stream, &line);
            }
        }
    }

    fn check_drain(&mut self) {
        if let MonitorState::Draining { deadline } = self.state {
            let now = self.clock.now();
            if now >= deadline {
                tracing::info!("Drain window closed");
                self.finish(now);
            } else if self.config.stop_on_final_event && self.final_event_seen {
                tracing::info!("Final step event seen; ending drain early");
                self.finish(now);
            }
        }
    }

    fn finish(&mut self, now: DateTime<Utc>) {
        self.state = MonitorState::Done;
        self.finished_at = Some(now);
    }

    /// Record a retryable failure. The drain deadline still applies, so a
    /// store that keeps failing cannot hold the monitor open forever.
    fn transient(&mut self, err: MonitorError) -> MonitorError {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.counters.transient_errors += 1;
        tracing::warn!(
            error = %err,
            consecutive = self.consecutive_errors,
            "Transient monitoring error"
        );
        self.check_drain();
        self.sleep_before_tick = true;
        err
    }

    fn abort(&mut self, err: MonitorError) -> MonitorError {
        tracing::error!(error = %err, "Monitoring aborted");
        let now = self.clock.now();
        self.finish(now);
        self.fatal = Some(err.clone());
        err
    }
}

impl Iterator for JobRunMonitor {
    type Item = Result<DomainEvent, MonitorError>;

    fn next(&mut self) -> Option<Self::Item> {
        let span = self.span.clone();
        let _entered = span.enter();

        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.state.is_done() {
                return None;
            }
            if self.sleep_before_tick {
                let delay = self
                    .config
                    .backoff
                    .delay(self.config.poll_interval, self.consecutive_errors);
                self.clock.sleep(delay);
                self.sleep_before_tick = false;
            }
            if let Err(err) = self.tick() {
                return Some(Err(err));
            }
        }
    }
}
