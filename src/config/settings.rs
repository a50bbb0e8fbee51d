//! Typed view of the merged configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::effective::ConfigError;
use crate::logs::LogGroupRef;
use crate::monitor::{BackoffPolicy, MonitorConfig};

/// Upper bound for the poll interval (one hour)
pub const MAX_POLL_INTERVAL_MS: u64 = 3_600_000;

/// Upper bound for the drain window (one day)
pub const MAX_WAIT_AFTER_DONE_MS: u64 = 86_400_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffMode {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffSettings {
    pub mode: BackoffMode,
    pub max_ms: u64,
}

/// Where the AWS backend points
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsSettings {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub virtual_cluster_id: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
}

/// Monitoring settings after all layers were merged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub poll_interval_ms: u64,
    pub max_wait_after_done_ms: u64,
    pub stop_on_final_event: bool,
    pub unwrap_json_messages: bool,
    pub overall_timeout_ms: u64,
    pub backoff: BackoffSettings,
    #[serde(default)]
    pub aws: AwsSettings,
}

impl Settings {
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        Settings::deserialize(value).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Check value bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 || self.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(ConfigError::ValidationError(format!(
                "poll_interval_ms must be in (0, {}], got {}",
                MAX_POLL_INTERVAL_MS, self.poll_interval_ms
            )));
        }

        if self.max_wait_after_done_ms > MAX_WAIT_AFTER_DONE_MS {
            return Err(ConfigError::ValidationError(format!(
                "max_wait_after_done_ms must be at most {}, got {}",
                MAX_WAIT_AFTER_DONE_MS, self.max_wait_after_done_ms
            )));
        }

        if self.backoff.mode == BackoffMode::Exponential
            && self.backoff.max_ms < self.poll_interval_ms
        {
            return Err(ConfigError::ValidationError(format!(
                "backoff.max_ms ({}) must not be below poll_interval_ms ({})",
                self.backoff.max_ms, self.poll_interval_ms
            )));
        }

        Ok(())
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        match self.backoff.mode {
            BackoffMode::Fixed => BackoffPolicy::Fixed,
            BackoffMode::Exponential => BackoffPolicy::Exponential {
                max: Duration::from_millis(self.backoff.max_ms),
            },
        }
    }

    /// Monitor parameters for one job
    pub fn monitor_config(
        &self,
        job_id: impl Into<String>,
        log_group: LogGroupRef,
        stream_prefix: impl Into<String>,
        start_timestamp_ms: i64,
    ) -> MonitorConfig {
        let overall_timeout =
            (self.overall_timeout_ms > 0).then(|| Duration::from_millis(self.overall_timeout_ms));

        MonitorConfig::new(job_id, log_group, stream_prefix, start_timestamp_ms)
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_max_wait_after_done(Duration::from_millis(self.max_wait_after_done_ms))
            .with_backoff(self.backoff_policy())
            .with_stop_on_final_event(self.stop_on_final_event)
            .with_unwrap_json_messages(self.unwrap_json_messages)
            .with_overall_timeout(overall_timeout)
    }
}
