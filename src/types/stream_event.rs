use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event type carrying an incremental text fragment.
pub const CONTENT_BLOCK_DELTA: &str = "content_block_delta";

/// Event type marking the end of an assistant message.
pub const MESSAGE_STOP: &str = "message_stop";

/// One decoded `data:` frame of the response stream.
///
/// Only `type` is required.  `delta` is kept as raw JSON so that an event
/// whose delta has an unexpected shape is still recognized by its type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamEvent {
    /// The event type, e.g. `content_block_delta` or `message_stop`.
    #[serde(rename = "type")]
    pub event_type: String,

    /// The delta, present on `content_block_delta` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<Value>,
}

impl StreamEvent {
    /// The text fragment carried by this event, if `delta.text` is a string.
    pub fn delta_text(&self) -> Option<&str> {
        self.delta
            .as_ref()
            .and_then(|delta| delta.get("text"))
            .and_then(Value::as_str)
    }

    /// True for `content_block_delta` events.
    pub fn is_content_delta(&self) -> bool {
        self.event_type == CONTENT_BLOCK_DELTA
    }

    /// True for `message_stop` events.
    pub fn is_message_stop(&self) -> bool {
        self.event_type == MESSAGE_STOP
    }
}
