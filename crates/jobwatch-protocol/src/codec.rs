//! Event line codec.
//!
//! An event travels through a log stream as one JSON line:
//!
//! ```text
//! {"event":"<base64 of envelope JSON>","eventDescr":"<human readable>"}
//! ```
//!
//! The base64 payload decodes to a versioned envelope
//! `{"schema_id", "schema_version", "event"}`. The schema identifier and the
//! event kind tag are checked before the event body is deserialized, so a
//! payload from another producer never reaches the typed decoder.

use std::io::{self, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DecodeError, EncodeError};
use crate::event::{DomainEvent, EventKind};
use crate::{EVENT_LINE_PREFIX, EVENT_SCHEMA_ID, EVENT_SCHEMA_VERSION, MAX_EVENT_LINE_BYTES};

/// Number of characters of an oversize line kept for diagnostics.
const DIAGNOSTIC_PREFIX_CHARS: usize = 32;

/// The JSON object written as a single log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedEventLine {
    /// Base64 of the serialized event envelope.
    pub event: String,

    /// Best-effort description for humans reading the raw logs.
    #[serde(rename = "eventDescr", default)]
    pub event_descr: String,
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    schema_id: &'static str,
    schema_version: u32,
    event: &'a DomainEvent,
}

/// Serialize an event to its envelope bytes.
pub fn event_to_bytes(event: &DomainEvent) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&EnvelopeRef {
        schema_id: EVENT_SCHEMA_ID,
        schema_version: EVENT_SCHEMA_VERSION,
        event,
    })
}

/// Encode an event as a log line, failing if the line would be oversize.
pub fn encode_checked(event: &DomainEvent) -> Result<String, EncodeError> {
    if let Some(field) = event.non_finite_field() {
        return Err(EncodeError::NonFinite(field));
    }

    let bytes = event_to_bytes(event)?;
    let line = serde_json::to_string(&EncodedEventLine {
        event: STANDARD.encode(bytes),
        event_descr: event.to_string(),
    })?;

    if line.len() > MAX_EVENT_LINE_BYTES {
        return Err(EncodeError::Oversize {
            size: line.len(),
            max: MAX_EVENT_LINE_BYTES,
            prefix: line.chars().take(DIAGNOSTIC_PREFIX_CHARS).collect(),
        });
    }

    Ok(line)
}

/// Encode an event as a log line.
///
/// Returns `None` when the event cannot be written; the reason is logged.
/// An oversize line is dropped whole, never truncated.
pub fn encode(event: &DomainEvent) -> Option<String> {
    match encode_checked(event) {
        Ok(line) => Some(line),
        Err(EncodeError::Oversize { size, prefix, .. }) => {
            tracing::warn!(
                size,
                kind = %event.kind(),
                "Dropping event of size {} bytes: '{}...'",
                size,
                prefix
            );
            None
        }
        Err(err) => {
            tracing::warn!(kind = %event.kind(), error = %err, "Dropping unserializable event");
            None
        }
    }
}

/// Whether a log message is an event line candidate.
///
/// Detection is an exact literal prefix match; most log lines are plain text.
pub fn is_event_line(message: &str) -> bool {
    message.starts_with(EVENT_LINE_PREFIX)
}

/// Decode a log message.
///
/// Returns `Ok(None)` for ordinary log text and an error for lines that look
/// like event lines but do not hold a valid event.
pub fn decode(message: &str) -> Result<Option<DomainEvent>, DecodeError> {
    if !is_event_line(message) {
        return Ok(None);
    }

    if message.len() > MAX_EVENT_LINE_BYTES {
        return Err(DecodeError::Oversize {
            size: message.len(),
            max: MAX_EVENT_LINE_BYTES,
        });
    }

    let line: EncodedEventLine = serde_json::from_str(message).map_err(DecodeError::LineJson)?;
    let bytes = STANDARD.decode(line.event.as_bytes())?;
    decode_envelope(&bytes).map(Some)
}

fn decode_envelope(bytes: &[u8]) -> Result<DomainEvent, DecodeError> {
    let envelope: Value = serde_json::from_slice(bytes).map_err(DecodeError::PayloadJson)?;

    let schema_id = envelope
        .get("schema_id")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField("schema_id"))?;
    if schema_id != EVENT_SCHEMA_ID {
        return Err(DecodeError::WrongFamily {
            found: schema_id.to_string(),
            expected: EVENT_SCHEMA_ID,
        });
    }

    let version = envelope
        .get("schema_version")
        .and_then(Value::as_u64)
        .ok_or(DecodeError::MissingField("schema_version"))?;
    if version != u64::from(EVENT_SCHEMA_VERSION) {
        return Err(DecodeError::UnsupportedVersion { found: version });
    }

    let event = envelope
        .get("event")
        .ok_or(DecodeError::MissingField("event"))?;

    let kind = event
        .get("payload")
        .and_then(|payload| payload.get("kind"))
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField("event.payload.kind"))?;
    if EventKind::parse(kind).is_none() {
        return Err(DecodeError::UnknownKind(kind.to_string()));
    }

    DomainEvent::deserialize(event).map_err(DecodeError::Schema)
}

/// Write an event line to `writer`, the job-side half of the protocol.
///
/// Returns `false` when the event was dropped.
pub fn emit_event<W: Write>(event: &DomainEvent, writer: &mut W) -> io::Result<bool> {
    match encode(event) {
        Some(line) => {
            writeln!(writer, "{}", line)?;
            writer.flush()?;
            Ok(true)
        }
        None => Ok(false),
    }
}
