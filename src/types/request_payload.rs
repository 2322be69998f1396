use serde::{Deserialize, Serialize};

use crate::types::Message;

/// The body of one streaming request to the Messages endpoint.
///
/// A payload is rebuilt from the whole transcript for every call and is never
/// stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestPayload {
    /// The model that will complete the conversation.
    pub model: String,

    /// Upper bound on the number of tokens generated for the reply.
    pub max_tokens: u32,

    /// The conversation so far, oldest first.
    pub messages: Vec<Message>,

    /// Always true: replies are consumed as an event stream.
    pub stream: bool,

    /// The system prompt.
    pub system: String,
}

impl RequestPayload {
    /// Create a streaming payload over a copy of `messages`.
    pub fn new(
        model: impl Into<String>,
        max_tokens: u32,
        messages: &[Message],
        system: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            max_tokens,
            messages: messages.to_vec(),
            stream: true,
            system: system.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    #[test]
    fn payload_serialization() {
        let payload = RequestPayload::new(
            "claude-3-opus-20240229",
            256,
            &[Message::user("<cmd>hello</cmd>")],
            "Assistant is in a CLI mood today.",
        );
        let json = to_value(&payload).unwrap();
        assert_eq!(
            json,
            json!({
                "model": "claude-3-opus-20240229",
                "max_tokens": 256,
                "messages": [{"role": "user", "content": "<cmd>hello</cmd>"}],
                "stream": true,
                "system": "Assistant is in a CLI mood today."
            })
        );
    }

    #[test]
    fn payload_survives_json_in_any_field_order() {
        let payload = RequestPayload::new(
            "model-x",
            32,
            &[
                Message::user("<cmd>one</cmd>"),
                Message::assistant("first"),
                Message::user("<cmd>two</cmd>"),
            ],
            "sys",
        );
        let reordered = r#"{
            "system": "sys",
            "stream": true,
            "messages": [
                {"content": "<cmd>one</cmd>", "role": "user"},
                {"content": "first", "role": "assistant"},
                {"content": "<cmd>two</cmd>", "role": "user"}
            ],
            "max_tokens": 32,
            "model": "model-x"
        }"#;
        let decoded: RequestPayload = serde_json::from_str(reordered).unwrap();
        assert_eq!(decoded, payload);

        let encoded = serde_json::to_string(&payload).unwrap();
        let decoded: RequestPayload = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.messages, payload.messages);
    }
}
