//! Command transport for the AWS CLI
//!
//! Abstracts running `aws` for testability. Provides:
//! - `CommandTransport`: run one CLI call, get its JSON output
//! - `ProcessTransport`: spawns the real `aws` binary
//! - `ScriptedTransport`: canned responses for tests

use std::collections::VecDeque;
use std::process::{Command, Stdio};
use std::sync::{Mutex, PoisonError};

use serde_json::Value;

/// Runs one AWS CLI call.
pub trait CommandTransport: Send + Sync {
    /// Run `aws <args>` and parse stdout as JSON.
    fn run(&self, args: &[String]) -> Result<Value, TransportError>;
}

/// Transport errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    /// The service reported the resource missing
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The service asked us to slow down
    #[error("request throttled: {0}")]
    Throttled(String),

    #[error("command exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("invalid CLI output: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Classify a failed CLI call by the AWS error code on stderr.
    pub fn from_stderr(status: impl Into<String>, stderr: &str) -> Self {
        let stderr = stderr.trim();
        if stderr.contains("ResourceNotFoundException") {
            TransportError::NotFound(stderr.to_string())
        } else if stderr.contains("ThrottlingException")
            || stderr.contains("TooManyRequestsException")
            || stderr.contains("Rate exceeded")
        {
            TransportError::Throttled(stderr.to_string())
        } else {
            TransportError::Failed {
                status: status.into(),
                stderr: stderr.to_string(),
            }
        }
    }
}

/// How to invoke the AWS CLI
#[derive(Debug, Clone)]
pub struct AwsCliConfig {
    /// Executable (default: `aws`)
    pub program: String,
    pub region: Option<String>,
    pub profile: Option<String>,
}

impl Default for AwsCliConfig {
    fn default() -> Self {
        Self {
            program: "aws".to_string(),
            region: None,
            profile: None,
        }
    }
}

/// Spawns the AWS CLI once per call
pub struct ProcessTransport {
    config: AwsCliConfig,
}

impl ProcessTransport {
    pub fn new(config: AwsCliConfig) -> Self {
        Self { config }
    }

    /// Full argument list: the call plus output, region and profile flags
    fn build_args(&self, args: &[String]) -> Vec<String> {
        let mut full = args.to_vec();
        full.push("--output".to_string());
        full.push("json".to_string());

        if let Some(region) = &self.config.region {
            full.push("--region".to_string());
            full.push(region.clone());
        }
        if let Some(profile) = &self.config.profile {
            full.push("--profile".to_string());
            full.push(profile.clone());
        }

        full
    }
}

impl CommandTransport for ProcessTransport {
    fn run(&self, args: &[String]) -> Result<Value, TransportError> {
        let args = self.build_args(args);
        tracing::debug!(program = %self.config.program, args = ?args, "Running AWS CLI");

        let output = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| TransportError::Spawn {
                program: self.config.program.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TransportError::from_stderr(output.status.to_string(), &stderr));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| TransportError::Protocol(format!("invalid JSON on stdout: {}", e)))
    }
}

/// Replays queued responses in order and records every call
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<Value, TransportError>>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response
    pub fn respond(&self, value: Value) -> &Self {
        self.push(Ok(value))
    }

    /// Queue a failure
    pub fn fail(&self, error: TransportError) -> &Self {
        self.push(Err(error))
    }

    fn push(&self, response: Result<Value, TransportError>) -> &Self {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
        self
    }

    /// Arguments of every call so far
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CommandTransport for ScriptedTransport {
    fn run(&self, args: &[String]) -> Result<Value, TransportError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(args.to_vec());

        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Protocol("no scripted response left".to_string())))
    }
}
