//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::stream;

use anthroshell::chat::LineSource;
use anthroshell::{ByteStream, Error, MessageTransport, RequestPayload, Result};

pub const HI: &str = "data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"hi\"}}\n";
pub const STOP: &str = "data: {\"type\":\"message_stop\"}\n";

pub fn delta(text: &str) -> String {
    format!(
        "event: content_block_delta\ndata: {}\n\n",
        serde_json::json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": text}})
    )
}

/// What the scripted transport does for one request.
#[derive(Clone)]
pub enum Reply {
    /// Answer with these chunks.
    Body(Vec<String>),
    /// Answer with these chunks, then fail the read.
    BodyThenError(Vec<String>),
    /// Fail before any body arrives.
    Refuse,
}

/// A transport that replays canned replies and records every request.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    requests: Arc<Mutex<Vec<RequestPayload>>>,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<RequestPayload> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl MessageTransport for ScriptedTransport {
    async fn open_stream(&self, payload: &RequestPayload) -> Result<ByteStream> {
        self.requests.lock().unwrap().push(payload.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Refuse);
        let (chunks, fail) = match reply {
            Reply::Body(chunks) => (chunks, false),
            Reply::BodyThenError(chunks) => (chunks, true),
            Reply::Refuse => return Err(Error::connection("connection refused", None)),
        };
        let mut items: Vec<Result<Bytes>> = chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
        if fail {
            items.push(Err(Error::streaming("connection reset by peer", None)));
        }
        Ok(Box::pin(stream::iter(items)))
    }
}

/// A line source that replays fixed lines and records the prompts it saw.
pub struct ScriptedLines {
    lines: VecDeque<String>,
    pub prompts: Vec<String>,
}

impl ScriptedLines {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            prompts: Vec::new(),
        }
    }
}

#[async_trait::async_trait]
impl LineSource for ScriptedLines {
    async fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        self.prompts.push(prompt.to_string());
        Ok(self.lines.pop_front())
    }
}
