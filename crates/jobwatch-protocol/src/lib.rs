//! jobwatch Protocol Types
//!
//! Defines the domain events a remote job reports back to its orchestrator,
//! and the codec that smuggles them through the job's log streams as single
//! JSON log lines.

pub mod codec;
pub mod error;
pub mod event;

pub use codec::{decode, emit_event, encode, encode_checked, is_event_line, EncodedEventLine};
pub use error::{DecodeError, EncodeError};
pub use event::{DomainEvent, EventKind, EventPayload};

/// Schema identifier of the serialized event envelope (the event family).
pub const EVENT_SCHEMA_ID: &str = "jobwatch/event@1";

/// Schema version of the serialized event envelope.
pub const EVENT_SCHEMA_VERSION: u32 = 1;

/// Literal prefix that marks a log line as an event line.
pub const EVENT_LINE_PREFIX: &str = "{\"event\":";

/// Largest event line, in bytes, that may be written to a log stream.
///
/// The log shipper stops delivering a stream entirely once a single record
/// is too large, so oversize events are dropped instead.
pub const MAX_EVENT_LINE_BYTES: usize = 64 * 1024;
