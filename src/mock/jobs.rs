//! In-memory job status service

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::job::{JobRunInfo, JobStatus, JobStatusSource, StatusError};

use super::failure::{FailureConfig, FailureInjector, Operation};
use super::state::MockJob;

/// Job status service whose jobs follow a scripted status progression.
#[derive(Debug, Default)]
pub struct MockJobService {
    jobs: Mutex<HashMap<String, MockJob>>,
    failures: Mutex<FailureInjector>,
}

impl MockJobService {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<String, MockJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a job reporting `statuses` one describe call at a time.
    /// Once the script runs out the last status sticks.
    pub fn add_job(&self, job_id: &str, statuses: &[JobStatus]) {
        self.jobs()
            .insert(job_id.to_string(), MockJob::scripted(job_id, statuses));
    }

    /// Replace whatever the job reports from the next describe on
    pub fn set_run_info(&self, info: JobRunInfo) {
        let mut jobs = self.jobs();
        let job = jobs
            .entry(info.job_id.clone())
            .or_insert_with(|| MockJob::scripted(&info.job_id, &[]));
        job.script.clear();
        job.script.push_back(info);
    }

    /// Replace the reported status from the next describe on
    pub fn set_status(&self, job_id: &str, status: JobStatus) {
        self.set_run_info(JobRunInfo::new(job_id, status));
    }

    /// Number of describe calls served for a job
    pub fn describe_calls(&self, job_id: &str) -> u32 {
        self.jobs().get(job_id).map_or(0, |job| job.describe_calls)
    }

    /// Inject a failure for `describe_job`
    pub fn inject(&self, config: FailureConfig) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .inject(Operation::DescribeJob, config);
    }
}

impl JobStatusSource for MockJobService {
    fn describe_job(&self, job_id: &str) -> Result<JobRunInfo, StatusError> {
        {
            let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(config) = failures.check(Operation::DescribeJob) {
                return Err(config.status_error(job_id));
            }
        }

        self.jobs()
            .get_mut(job_id)
            .map(MockJob::describe)
            .ok_or_else(|| StatusError::UnknownJob(job_id.to_string()))
    }
}
