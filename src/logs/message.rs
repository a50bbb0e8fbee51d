//! Log message unwrapping

use std::borrow::Cow;

use serde_json::Value;

/// Strip a JSON wrapper added by the log shipper.
///
/// Shippers often store each line as `{"message": "<line>", ...}`. When the
/// message is such an object, the inner line is returned; any other message
/// (plain text, event lines, JSON without a string `message`) is returned
/// unchanged.
pub fn unwrap_message(message: &str) -> Cow<'_, str> {
    if !message.starts_with('{') {
        return Cow::Borrowed(message);
    }

    match serde_json::from_str::<Value>(message) {
        Ok(Value::Object(mut map)) => match map.remove("message") {
            Some(Value::String(inner)) => Cow::Owned(inner),
            _ => Cow::Borrowed(message),
        },
        _ => Cow::Borrowed(message),
    }
}
