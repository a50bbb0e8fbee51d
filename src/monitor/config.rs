//! Monitor parameters

use std::time::Duration;

use crate::logs::LogGroupRef;

/// Default pause between two ticks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default grace period for trailing logs once the job has finished
pub const DEFAULT_MAX_WAIT_AFTER_DONE: Duration = Duration::from_secs(120);

/// How the pause between ticks reacts to consecutive transient errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffPolicy {
    /// Always wait the poll interval
    #[default]
    Fixed,
    /// Double the wait for every consecutive transient error, up to `max`
    Exponential { max: Duration },
}

impl BackoffPolicy {
    /// Pause before the next tick after `consecutive_errors` failed ticks
    pub fn delay(&self, poll_interval: Duration, consecutive_errors: u32) -> Duration {
        match self {
            BackoffPolicy::Fixed => poll_interval,
            BackoffPolicy::Exponential { max } => {
                let factor = 1u32 << consecutive_errors.min(16);
                poll_interval.saturating_mul(factor).min(*max).max(poll_interval)
            }
        }
    }
}

/// What to monitor and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Job run to watch
    pub job_id: String,

    /// Log group the job writes to
    pub log_group: LogGroupRef,

    /// Only streams whose name starts with this prefix are tailed
    pub stream_prefix: String,

    /// Records older than this (epoch millis) are never returned
    pub start_timestamp_ms: i64,

    /// Pause between ticks
    pub poll_interval: Duration,

    /// How long to keep tailing after the job reached a terminal status
    pub max_wait_after_done: Duration,

    /// Pause policy after transient errors
    pub backoff: BackoffPolicy,

    /// End the drain window early once a step success/failure event was seen
    pub stop_on_final_event: bool,

    /// Strip `{"message": ...}` wrappers added by the log shipper
    pub unwrap_json_messages: bool,

    /// Give up after this much wall-clock time
    pub overall_timeout: Option<Duration>,
}

impl MonitorConfig {
    /// Create a config with default timings
    pub fn new(
        job_id: impl Into<String>,
        log_group: LogGroupRef,
        stream_prefix: impl Into<String>,
        start_timestamp_ms: i64,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            log_group,
            stream_prefix: stream_prefix.into(),
            start_timestamp_ms,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait_after_done: DEFAULT_MAX_WAIT_AFTER_DONE,
            backoff: BackoffPolicy::Fixed,
            stop_on_final_event: false,
            unwrap_json_messages: true,
            overall_timeout: None,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_wait_after_done(mut self, max_wait: Duration) -> Self {
        self.max_wait_after_done = max_wait;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_stop_on_final_event(mut self, stop: bool) -> Self {
        self.stop_on_final_event = stop;
        self
    }

    pub fn with_unwrap_json_messages(mut self, unwrap: bool) -> Self {
        self.unwrap_json_messages = unwrap;
        self
    }

    pub fn with_overall_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.overall_timeout = timeout;
        self
    }
}
