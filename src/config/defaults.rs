//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Pause between ticks (default: 10000)
    pub poll_interval_ms: u64,

    /// Drain window after the job finished (default: 120000)
    pub max_wait_after_done_ms: u64,

    /// End the drain window on a final step event (default: false)
    pub stop_on_final_event: bool,

    /// Unwrap `{"message": ...}` log lines (default: true)
    pub unwrap_json_messages: bool,

    /// Overall monitoring limit, 0 disables (default: 0)
    pub overall_timeout_ms: u64,

    /// Backoff mode (default: "fixed")
    pub backoff_mode: String,

    /// Exponential backoff ceiling (default: 300000)
    pub backoff_max_ms: u64,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10_000,
            max_wait_after_done_ms: 120_000,
            stop_on_final_event: false,
            unwrap_json_messages: true,
            overall_timeout_ms: 0,
            backoff_mode: "fixed".to_string(),
            backoff_max_ms: 300_000,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "poll_interval_ms": self.poll_interval_ms,
            "max_wait_after_done_ms": self.max_wait_after_done_ms,
            "stop_on_final_event": self.stop_on_final_event,
            "unwrap_json_messages": self.unwrap_json_messages,
            "overall_timeout_ms": self.overall_timeout_ms,
            "backoff": {
                "mode": self.backoff_mode,
                "max_ms": self.backoff_max_ms
            },
            "aws": {}
        })
    }
}
