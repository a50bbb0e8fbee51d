//! Monitor summary (summary.json)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobStatus;

/// Schema version for summary.json
pub const SUMMARY_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for summary.json
pub const SUMMARY_SCHEMA_ID: &str = "jobwatch/monitor_summary@1";

/// Running counters kept by the monitor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorCounters {
    /// Ticks run (status query + log fetch attempts)
    pub ticks: u64,
    /// Records returned by the tailer
    pub records_fetched: u64,
    /// Events decoded and yielded
    pub events_decoded: u64,
    /// Event lines that failed to decode
    pub decode_errors: u64,
    /// Transient status or log query failures
    pub transient_errors: u64,
}

/// Outcome of one monitoring run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSummary {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// Monitored job
    pub job_id: String,

    /// Tailed log group
    pub log_group: String,

    /// Tailed stream prefix
    pub stream_prefix: String,

    /// When the first tick ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When monitoring ended
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Terminal job status, once observed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_status: Option<JobStatus>,

    /// Provider failure reason for failed jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Fatal monitoring error, if monitoring was aborted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Streams tailed
    pub streams: Vec<String>,

    /// Counters
    #[serde(flatten)]
    pub counters: MonitorCounters,

    /// Human-readable summary
    pub human_summary: String,
}

impl MonitorSummary {
    /// Build the one-line description used in `human_summary`
    pub fn describe(
        job_id: &str,
        final_status: Option<JobStatus>,
        error: Option<&str>,
        counters: &MonitorCounters,
    ) -> String {
        let outcome = match (final_status, error) {
            (_, Some(error)) => format!("monitoring aborted: {}", error),
            (Some(status), None) => format!("job finished {}", status),
            (None, None) => "job still running".to_string(),
        };
        format!(
            "{}: {} ({} events, {} records, {} decode errors, {} transient errors)",
            job_id,
            outcome,
            counters.events_decoded,
            counters.records_fetched,
            counters.decode_errors,
            counters.transient_errors
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_outcomes() {
        let counters = MonitorCounters {
            events_decoded: 3,
            records_fetched: 40,
            ..Default::default()
        };

        let done = MonitorSummary::describe("job-1", Some(JobStatus::Succeeded), None, &counters);
        assert_eq!(
            done,
            "job-1: job finished SUCCEEDED (3 events, 40 records, 0 decode errors, 0 transient errors)"
        );

        let aborted = MonitorSummary::describe("job-1", None, Some("unknown job id: job-1"), &counters);
        assert!(aborted.contains("monitoring aborted: unknown job id"));
    }

    #[test]
    fn test_counters_flatten_into_summary() {
        let summary = MonitorSummary {
            schema_version: SUMMARY_SCHEMA_VERSION,
            schema_id: SUMMARY_SCHEMA_ID.to_string(),
            job_id: "job-1".to_string(),
            log_group: "g".to_string(),
            stream_prefix: "p/".to_string(),
            started_at: None,
            finished_at: None,
            final_status: Some(JobStatus::Failed),
            failure_reason: Some("USER_ERROR".to_string()),
            error: None,
            streams: vec!["p/stdout".to_string()],
            counters: MonitorCounters {
                ticks: 4,
                ..Default::default()
            },
            human_summary: String::new(),
        };

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["ticks"], 4);
        assert_eq!(json["final_status"], "FAILED");
        assert!(json.get("started_at").is_none());
    }
}
