//! Manual clock for deterministic tests

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::monitor::Clock;

/// A clock that only moves when told to; `sleep` advances it instantly.
#[derive(Debug)]
pub struct ManualClock {
    inner: Mutex<ClockState>,
}

#[derive(Debug)]
struct ClockState {
    now: DateTime<Utc>,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    /// Create a clock at `now`
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new(ClockState {
                now,
                sleeps: Vec::new(),
            }),
        }
    }

    /// Create a clock at the given epoch milliseconds
    pub fn at_millis(epoch_ms: i64) -> Self {
        let now = Utc
            .timestamp_millis_opt(epoch_ms)
            .single()
            .unwrap_or_else(Utc::now);
        Self::at(now)
    }

    /// Move the clock forward without recording a sleep
    pub fn advance(&self, duration: Duration) {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.now += crate::monitor::clock::to_chrono(duration);
    }

    /// Every sleep requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sleeps
            .clone()
    }

    /// Total time slept
    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).now
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.now += crate::monitor::clock::to_chrono(duration);
        state.sleeps.push(duration);
    }
}
