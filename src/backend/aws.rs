//! CloudWatch Logs and EMR on EKS over the AWS CLI

use std::sync::Arc;

use serde::Deserialize;

use super::transport::{CommandTransport, TransportError};
use crate::job::{JobRunInfo, JobStatus, JobStatusSource, StatusError};
use crate::logs::{LogGroupRef, LogPage, LogRecord, LogStore, LogStoreError};

impl From<TransportError> for LogStoreError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NotFound(msg) => LogStoreError::NotFound(msg),
            TransportError::Throttled(msg) => LogStoreError::Throttled(msg),
            other => LogStoreError::Transport(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeLogStreamsOutput {
    #[serde(default)]
    log_streams: Vec<LogStreamEntry>,
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogStreamEntry {
    log_stream_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilterLogEventsOutput {
    #[serde(default)]
    events: Vec<FilteredEvent>,
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilteredEvent {
    log_stream_name: String,
    timestamp: i64,
    #[serde(default)]
    message: String,
    event_id: Option<String>,
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

/// CloudWatch Logs through `aws logs`
pub struct AwsLogStore {
    transport: Arc<dyn CommandTransport>,
}

impl AwsLogStore {
    pub fn new(transport: Arc<dyn CommandTransport>) -> Self {
        Self { transport }
    }
}

impl LogStore for AwsLogStore {
    fn list_streams(&self, group: &LogGroupRef, prefix: &str) -> Result<Vec<String>, LogStoreError> {
        let mut streams = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut call = args(&[
                "logs",
                "describe-log-streams",
                "--log-group-name",
                group.name(),
                "--log-stream-name-prefix",
                prefix,
                "--no-paginate",
            ]);
            if let Some(token) = &next_token {
                call.extend(args(&["--next-token", token.as_str()]));
            }

            let output: DescribeLogStreamsOutput = serde_json::from_value(self.transport.run(&call)?)
                .map_err(|e| LogStoreError::Transport(format!("describe-log-streams output: {}", e)))?;
            streams.extend(output.log_streams.into_iter().map(|s| s.log_stream_name));

            match output.next_token {
                Some(token) if next_token.as_deref() != Some(token.as_str()) => {
                    next_token = Some(token)
                }
                _ => break,
            }
        }

        Ok(streams)
    }

    fn read_page(
        &self,
        group: &LogGroupRef,
        stream: &str,
        start_ms: i64,
        next_token: Option<&str>,
    ) -> Result<LogPage, LogStoreError> {
        let start = start_ms.to_string();
        let mut call = args(&[
            "logs",
            "filter-log-events",
            "--log-group-name",
            group.name(),
            "--log-stream-names",
            stream,
            "--start-time",
            start.as_str(),
            "--no-paginate",
        ]);
        if let Some(token) = next_token {
            call.extend(args(&["--next-token", token]));
        }

        let output: FilterLogEventsOutput = serde_json::from_value(self.transport.run(&call)?)
            .map_err(|e| LogStoreError::Transport(format!("filter-log-events output: {}", e)))?;

        let records = output
            .events
            .into_iter()
            .map(|event| LogRecord {
                stream: event.log_stream_name,
                timestamp: event.timestamp,
                message: event.message,
                event_id: event.event_id,
            })
            .collect();

        Ok(LogPage {
            records,
            next_token: output.next_token,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeJobRunOutput {
    job_run: JobRunEntry,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobRunEntry {
    id: String,
    state: String,
    failure_reason: Option<String>,
    state_details: Option<String>,
}

/// Map an EMR on EKS job run state to a job status.
pub fn map_job_state(state: &str) -> Option<JobStatus> {
    match state {
        "PENDING" | "SUBMITTED" => Some(JobStatus::Pending),
        "RUNNING" | "CANCEL_PENDING" => Some(JobStatus::Running),
        "COMPLETED" => Some(JobStatus::Succeeded),
        "FAILED" => Some(JobStatus::Failed),
        "CANCELLED" => Some(JobStatus::Cancelled),
        _ => None,
    }
}

/// EMR on EKS job runs through `aws emr-containers`
pub struct AwsJobStatusSource {
    transport: Arc<dyn CommandTransport>,
    virtual_cluster_id: String,
}

impl AwsJobStatusSource {
    pub fn new(transport: Arc<dyn CommandTransport>, virtual_cluster_id: impl Into<String>) -> Self {
        Self {
            transport,
            virtual_cluster_id: virtual_cluster_id.into(),
        }
    }
}

impl JobStatusSource for AwsJobStatusSource {
    fn describe_job(&self, job_id: &str) -> Result<JobRunInfo, StatusError> {
        let call = args(&[
            "emr-containers",
            "describe-job-run",
            "--id",
            job_id,
            "--virtual-cluster-id",
            self.virtual_cluster_id.as_str(),
        ]);

        let value = self.transport.run(&call).map_err(|err| match err {
            TransportError::NotFound(_) => StatusError::UnknownJob(job_id.to_string()),
            other => StatusError::Transient(other.to_string()),
        })?;
        let output: DescribeJobRunOutput = serde_json::from_value(value)
            .map_err(|e| StatusError::Transient(format!("describe-job-run output: {}", e)))?;
        let run = output.job_run;

        let status = map_job_state(&run.state).ok_or_else(|| {
            StatusError::Transient(format!("unrecognized job run state '{}'", run.state))
        })?;

        Ok(JobRunInfo {
            job_id: run.id,
            status,
            provider_state: Some(run.state),
            failure_reason: run.failure_reason,
            state_details: run.state_details,
        })
    }
}
