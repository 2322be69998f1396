//! An interactive shell that forwards each line to the Anthropic Messages API
//! and streams the reply back, reachable from a local terminal or over SSH.

// Public modules
pub mod chat;
pub mod client;
pub mod error;
pub mod observability;
pub mod render;
pub mod sse;
pub mod ssh;
pub mod transcript;
pub mod types;

// Re-exports
pub use client::{Anthropic, ByteStream, MessageTransport};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use sse::{DecodeStats, StreamDecoder, StreamOutcome, StreamReport, decode_stream};
pub use transcript::Transcript;
pub use types::*;
