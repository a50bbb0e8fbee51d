//! Destinations for ordinary (non-event) log lines

use std::io::{self, Write};

/// Receives every log line that is not an event.
///
/// `stream` is the stream name relative to the tailed prefix, e.g.
/// `stdout` or `stderr`.
pub trait LogSink: Send {
    fn write_line(&mut self, stream: &str, line: &str);
}

/// Writes lines from `stderr`-suffixed streams to stderr and everything else
/// to stdout, so the remote job's output reads like local output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdioSink;

impl LogSink for StdioSink {
    fn write_line(&mut self, stream: &str, line: &str) {
        let result = if stream.ends_with("stderr") {
            writeln!(io::stderr().lock(), "{}", line)
        } else {
            writeln!(io::stdout().lock(), "{}", line)
        };
        if let Err(err) = result {
            tracing::debug!(stream, error = %err, "Failed to forward log line");
        }
    }
}

/// Forwards lines as `tracing` events under the `jobwatch::remote` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write_line(&mut self, stream: &str, line: &str) {
        tracing::info!(target: "jobwatch::remote", stream, "{}", line);
    }
}

/// Discards lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn write_line(&mut self, _stream: &str, _line: &str) {}
}
