//! Capturing log sink

use std::sync::{Arc, Mutex, PoisonError};

use crate::monitor::LogSink;

/// Keeps every forwarded line; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    lines: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(stream, line)` pairs in arrival order
    pub fn lines(&self) -> Vec<(String, String)> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Lines forwarded for one stream
    pub fn lines_for(&self, stream: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(s, _)| s == stream)
            .map(|(_, line)| line)
            .collect()
    }
}

impl LogSink for RecordingSink {
    fn write_line(&mut self, stream: &str, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((stream.to_string(), line.to_string()));
    }
}
