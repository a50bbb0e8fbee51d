//! AWS backend
//!
//! Implements [`LogStore`](crate::logs::LogStore) over CloudWatch Logs and
//! [`JobStatusSource`](crate::job::JobStatusSource) over EMR on EKS by
//! shelling out to the AWS CLI.

mod aws;
mod transport;

pub use aws::{map_job_state, AwsJobStatusSource, AwsLogStore};
pub use transport::{AwsCliConfig, CommandTransport, ProcessTransport, ScriptedTransport, TransportError};
