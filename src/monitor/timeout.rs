//! Overall wall-clock limit for a monitoring run
//!
//! The limit is measured with the monitor's clock, so runs driven by a
//! manual clock time out deterministically. Hitting it never cancels the
//! remote job; the monitor just stops watching.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::clock::to_chrono;

/// Timeout check result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutStatus {
    /// Still within the limit (or no limit set)
    Ok,
    /// Overall wall-clock limit exceeded
    OverallTimeout,
}

impl TimeoutStatus {
    pub fn is_timeout(&self) -> bool {
        !matches!(self, TimeoutStatus::Ok)
    }
}

/// Tracks elapsed time against an optional limit.
#[derive(Debug, Clone)]
pub struct TimeoutEnforcer {
    limit: Option<Duration>,
    started_at: Option<DateTime<Utc>>,
}

impl TimeoutEnforcer {
    pub fn new(limit: Option<Duration>) -> Self {
        Self {
            limit,
            started_at: None,
        }
    }

    /// Mark the start of the run; later calls keep the first start time.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.started_at.get_or_insert(now);
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }

    /// Check the limit at `now`. An unstarted enforcer never times out.
    pub fn check(&self, now: DateTime<Utc>) -> TimeoutStatus {
        match (self.limit, self.started_at) {
            (Some(limit), Some(started_at)) if now - started_at >= to_chrono(limit) => {
                TimeoutStatus::OverallTimeout
            }
            _ => TimeoutStatus::Ok,
        }
    }

    /// Time left before the limit, if one is set.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let limit = self.limit?;
        let elapsed = match self.started_at {
            Some(started_at) => (now - started_at).to_std().unwrap_or_default(),
            None => Duration::ZERO,
        };
        Some(limit.saturating_sub(elapsed))
    }
}
