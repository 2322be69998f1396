// Public modules
pub mod message;
pub mod request_payload;
pub mod stream_event;

// Re-exports
pub use message::{Message, MessageRole};
pub use request_payload::RequestPayload;
pub use stream_event::{CONTENT_BLOCK_DELTA, MESSAGE_STOP, StreamEvent};
