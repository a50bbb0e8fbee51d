//! Remote job status
//!
//! Job statuses: PENDING → RUNNING → {SUCCEEDED | FAILED | CANCELLED}
//!
//! The monitor only reads status; submitting and cancelling jobs belongs to
//! the orchestrator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a remote job run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Accepted, waiting for capacity
    Pending,
    /// Executing
    Running,
    /// Finished successfully
    Succeeded,
    /// Finished with an error
    Failed,
    /// Cancelled before finishing
    Cancelled,
}

impl JobStatus {
    /// Returns true once the job will not change status again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "RUNNING" => Ok(JobStatus::Running),
            "SUCCEEDED" => Ok(JobStatus::Succeeded),
            "FAILED" => Ok(JobStatus::Failed),
            "CANCELLED" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Snapshot of a job run as reported by the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRunInfo {
    /// Job identifier
    pub job_id: String,

    /// Normalized status
    pub status: JobStatus,

    /// State name as reported by the provider, when it differs in vocabulary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_state: Option<String>,

    /// Why the job failed (terminal failures only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Free-form details about the current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_details: Option<String>,
}

impl JobRunInfo {
    pub fn new(job_id: impl Into<String>, status: JobStatus) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            provider_state: None,
            failure_reason: None,
            state_details: None,
        }
    }

    pub fn with_failure(
        mut self,
        failure_reason: impl Into<String>,
        state_details: impl Into<String>,
    ) -> Self {
        self.failure_reason = Some(failure_reason.into());
        self.state_details = Some(state_details.into());
        self
    }
}

/// Errors from a job status query
#[derive(Debug, Clone, thiserror::Error)]
pub enum StatusError {
    /// The cluster does not know this job; monitoring cannot proceed
    #[error("unknown job id: {0}")]
    UnknownJob(String),

    /// Throttling or a network fault; asking again later may succeed
    #[error("job status query failed: {0}")]
    Transient(String),
}

impl StatusError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StatusError::Transient(_))
    }
}

/// Source of job run status.
pub trait JobStatusSource: Send + Sync {
    /// Describe the current state of `job_id`.
    fn describe_job(&self, job_id: &str) -> Result<JobRunInfo, StatusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_parse_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Succeeded,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>(), Ok(status));
        }
        assert!("COMPLETED".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_screaming() {
        let json = serde_json::to_string(&JobStatus::Cancelled).unwrap();
        assert_eq!(json, "\"CANCELLED\"");
    }

    #[test]
    fn test_status_error_retryable() {
        assert!(StatusError::Transient("throttled".into()).is_retryable());
        assert!(!StatusError::UnknownJob("job-1".into()).is_retryable());
    }

    #[test]
    fn test_run_info_failure_details() {
        let info = JobRunInfo::new("job-1", JobStatus::Failed)
            .with_failure("USER_ERROR", "driver exited with code 1");
        assert_eq!(info.failure_reason.as_deref(), Some("USER_ERROR"));
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["status"], "FAILED");
        assert!(json.get("provider_state").is_none());
    }
}
