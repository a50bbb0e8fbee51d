//! Domain events reported by a remote job.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind tag of a domain event.
///
/// These tags are stable: they are validated on decode before any other
/// field of the event is looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A step started executing.
    StepStart,
    /// A step produced a named output.
    StepOutput,
    /// A step completed successfully.
    StepSuccess,
    /// A step failed.
    StepFailure,
    /// A step was skipped.
    StepSkipped,
    /// A step materialized an asset.
    AssetMaterialization,
    /// Free-form engine diagnostic.
    EngineEvent,
}

impl EventKind {
    /// Every known kind.
    pub const ALL: [EventKind; 7] = [
        EventKind::StepStart,
        EventKind::StepOutput,
        EventKind::StepSuccess,
        EventKind::StepFailure,
        EventKind::StepSkipped,
        EventKind::AssetMaterialization,
        EventKind::EngineEvent,
    ];

    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StepStart => "STEP_START",
            Self::StepOutput => "STEP_OUTPUT",
            Self::StepSuccess => "STEP_SUCCESS",
            Self::StepFailure => "STEP_FAILURE",
            Self::StepSkipped => "STEP_SKIPPED",
            Self::AssetMaterialization => "ASSET_MATERIALIZATION",
            Self::EngineEvent => "ENGINE_EVENT",
        }
    }

    /// Parse a wire name. Returns `None` for unknown tags.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Whether the event ends the step it belongs to.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::StepSuccess | Self::StepFailure)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output produced by a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutputData {
    pub output_name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Successful step completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSuccessData {
    /// Wall-clock duration of the step in milliseconds.
    pub duration_ms: f64,
}

/// Error raised inside the remote job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stack: Vec<String>,
}

/// Step failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailureData {
    pub error: ErrorInfo,
    /// Whether the failure came from user code rather than the framework.
    #[serde(default)]
    pub user_failure: bool,
}

/// Asset materialized by a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializationData {
    pub asset_key: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Engine diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEventData {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Kind-specific payload of a domain event, tagged by [`EventKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    StepStart,
    StepOutput(StepOutputData),
    StepSuccess(StepSuccessData),
    StepFailure(StepFailureData),
    StepSkipped,
    AssetMaterialization(MaterializationData),
    EngineEvent(EngineEventData),
}

impl EventPayload {
    /// Kind tag of this payload.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::StepStart => EventKind::StepStart,
            Self::StepOutput(_) => EventKind::StepOutput,
            Self::StepSuccess(_) => EventKind::StepSuccess,
            Self::StepFailure(_) => EventKind::StepFailure,
            Self::StepSkipped => EventKind::StepSkipped,
            Self::AssetMaterialization(_) => EventKind::AssetMaterialization,
            Self::EngineEvent(_) => EventKind::EngineEvent,
        }
    }
}

/// A structured event emitted by a remote job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Name of the job (pipeline) that emitted the event.
    pub job_name: String,

    /// Step the event belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_key: Option<String>,

    /// Human-readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Kind-tagged payload.
    pub payload: EventPayload,
}

impl DomainEvent {
    /// Create an event with no step and no message.
    pub fn new(job_name: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            job_name: job_name.into(),
            step_key: None,
            message: None,
            payload,
        }
    }

    /// Attach the step key.
    pub fn with_step(mut self, step_key: impl Into<String>) -> Self {
        self.step_key = Some(step_key.into());
        self
    }

    /// Attach a message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Kind tag of the event.
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Whether the event ends its step (success or failure).
    pub fn is_final(&self) -> bool {
        self.kind().is_final()
    }

    /// Name of the first float field holding NaN or an infinity.
    ///
    /// JSON has no representation for these, so such an event cannot be
    /// written.
    pub fn non_finite_field(&self) -> Option<&'static str> {
        match &self.payload {
            EventPayload::StepSuccess(data) if !data.duration_ms.is_finite() => {
                Some("duration_ms")
            }
            _ => None,
        }
    }
}

impl fmt::Display for DomainEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} for job '{}'", self.kind(), self.job_name)?;
        if let Some(step) = &self.step_key {
            write!(f, " step '{}'", step)?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}
