//! The per-session conversation history.

use crate::types::{Message, MessageRole, RequestPayload};

/// An ordered, append-only list of messages exchanged in one session.
///
/// The transcript does not enforce user/assistant alternation: a turn whose
/// request fails leaves its user message behind, and the next request carries
/// it along.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Creates an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a user message.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    /// Appends an assistant message.
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Number of messages recorded.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when nothing has been said yet.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent message, if any.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages with the given role.
    pub fn count_role(&self, role: MessageRole) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }

    /// Builds a streaming request payload over the whole transcript.
    pub fn to_payload(&self, model: &str, max_tokens: u32, system: &str) -> RequestPayload {
        RequestPayload::new(model, max_tokens, &self.messages, system)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_transcript_is_empty() {
        let transcript = Transcript::new();
        assert!(transcript.is_empty());
        assert!(transcript.last().is_none());
    }

    #[test]
    fn insertion_order_is_kept() {
        let mut transcript = Transcript::new();
        transcript.push_user("<cmd>a</cmd>");
        transcript.push_assistant("b");
        transcript.push_user("<cmd>c</cmd>");
        let contents: Vec<&str> = transcript
            .messages()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["<cmd>a</cmd>", "b", "<cmd>c</cmd>"]);
        assert_eq!(transcript.count_role(MessageRole::User), 2);
        assert_eq!(transcript.count_role(MessageRole::Assistant), 1);
    }

    #[test]
    fn dangling_user_messages_are_allowed() {
        let mut transcript = Transcript::new();
        transcript.push_user("<cmd>first</cmd>");
        transcript.push_user("<cmd>second</cmd>");
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.last(), Some(&Message::user("<cmd>second</cmd>")));
    }

    #[test]
    fn payload_carries_every_message() {
        let mut transcript = Transcript::new();
        transcript.push_user("<cmd>hi</cmd>");
        transcript.push_assistant("hello");
        let payload = transcript.to_payload("m", 256, "s");
        assert_eq!(payload.messages, transcript.messages());
        assert!(payload.stream);
        assert_eq!(payload.max_tokens, 256);
    }
}
