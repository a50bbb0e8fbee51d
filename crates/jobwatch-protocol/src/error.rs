//! Error types for the event codec.

/// Failure to turn an event into a log line.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("event field '{0}' is not a finite number")]
    NonFinite(&'static str),

    /// The encoded line is larger than the log shipper accepts.
    #[error("event line of {size} bytes exceeds maximum {max} bytes: '{prefix}...'")]
    Oversize {
        size: usize,
        max: usize,
        /// First characters of the line, for diagnostics.
        prefix: String,
    },
}

/// A line carried the event prefix but is not a valid event.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("event line of {size} bytes exceeds maximum {max} bytes")]
    Oversize { size: usize, max: usize },

    #[error("event line is not valid JSON: {0}")]
    LineJson(serde_json::Error),

    #[error("event field is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("event payload is not valid JSON: {0}")]
    PayloadJson(serde_json::Error),

    #[error("event envelope is missing field '{0}'")]
    MissingField(&'static str),

    #[error("event belongs to family '{found}', expected '{expected}'")]
    WrongFamily { found: String, expected: &'static str },

    #[error("unsupported event schema version {found}")]
    UnsupportedVersion { found: u64 },

    #[error("unknown event kind '{0}'")]
    UnknownKind(String),

    #[error("event does not match schema for its kind: {0}")]
    Schema(serde_json::Error),
}
