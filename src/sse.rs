//! Server-Sent Events (SSE) decoding for streaming responses.
//!
//! The Messages endpoint answers a streaming request with newline-delimited
//! frames.  Only `data: ` lines carry payload; each holds one JSON event.  The
//! decoder folds `content_block_delta` text into an accumulator and commits the
//! accumulated text as one assistant reply on every `message_stop`.
//!
//! Decoding is best-effort: a frame that is not valid JSON is counted and
//! skipped, and a stream that ends before its `message_stop` is reported as
//! [`StreamOutcome::Partial`] rather than as an error.

use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::error::Result;
use crate::observability::{
    STREAM_BYTES, STREAM_COMPLETIONS, STREAM_ERRORS, STREAM_FRAMES, STREAM_MALFORMED_FRAMES,
    STREAM_PARTIAL,
};
use crate::render::{Colorizer, OutputSink};
use crate::transcript::Transcript;
use crate::types::StreamEvent;

/// Prefix of the lines that carry an event.
pub const DATA_PREFIX: &str = "data: ";

/// Longest line the decoder buffers.  Anything longer is counted as
/// malformed and skipped up to its newline.
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// What a single line of the stream turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Not a `data: ` line: blank lines, `event:` lines and comments.
    Ignored,
    /// A `data: ` line whose payload is not a valid event.
    Malformed,
    /// A `content_block_delta` event, with its text fragment if it has one.
    Delta(Option<String>),
    /// A `message_stop` event.
    Stop,
    /// Any other well-formed event.
    Other(String),
}

/// Classifies one line of the stream.
///
/// The line may still carry its terminator; surrounding whitespace of the
/// payload is trimmed before parsing.
pub fn decode_frame(line: &str) -> Frame {
    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return Frame::Ignored;
    };
    let event = match serde_json::from_str::<StreamEvent>(data.trim()) {
        Ok(event) => event,
        Err(err) => {
            tracing::debug!(error = %err, "skipping malformed stream frame");
            return Frame::Malformed;
        }
    };
    if event.is_content_delta() {
        Frame::Delta(event.delta_text().map(String::from))
    } else if event.is_message_stop() {
        Frame::Stop
    } else {
        Frame::Other(event.event_type)
    }
}

/// How a stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// At least one reply was committed and no text was left over.
    Complete,
    /// The stream ended with text that no `message_stop` committed.
    ///
    /// The text is not added to the transcript.
    Partial {
        /// The uncommitted text.
        discarded: String,
    },
    /// The stream ended without committing a reply or producing any text.
    Empty,
}

impl StreamOutcome {
    /// True unless the stream ended cleanly after a completion.
    pub fn is_incomplete(&self) -> bool {
        !matches!(self, StreamOutcome::Complete)
    }
}

/// Counters describing one decode pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Bytes received.
    pub bytes: usize,
    /// `data: ` lines seen.
    pub frames: usize,
    /// `data: ` lines skipped because they did not parse.
    pub malformed: usize,
    /// Replies committed by `message_stop`.
    pub completions: usize,
}

/// The result of [`decode_stream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamReport {
    /// How the stream ended.
    pub outcome: StreamOutcome,
    /// Counters for the pass.
    pub stats: DecodeStats,
}

/// Incremental decoder state.
///
/// Feed it raw chunks with [`push`](Self::push); lines and UTF-8 sequences may
/// be split anywhere between chunks.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    pending: Vec<u8>,
    // Prefix of `pending` already known to hold no newline.
    scanned: usize,
    // Set while skipping the rest of an overlong line.
    overflow: bool,
    accumulator: String,
    stats: DecodeStats,
}

impl StreamDecoder {
    /// Creates a decoder with an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a chunk and returns the replies it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.stats.bytes += chunk.len();
        let mut pending = std::mem::take(&mut self.pending);
        pending.extend_from_slice(chunk);

        let mut completed = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = pending[from..].iter().position(|b| *b == b'\n') {
            let end = from + offset;
            if self.overflow {
                self.overflow = false;
            } else if let Some(reply) = self.feed_line(&pending[start..=end]) {
                completed.push(reply);
            }
            start = end + 1;
            from = start;
        }
        pending.drain(..start);

        if pending.len() > MAX_LINE_BYTES {
            if !self.overflow {
                self.stats.malformed += 1;
                tracing::warn!(
                    limit = MAX_LINE_BYTES,
                    "skipping overlong stream line"
                );
            }
            self.overflow = true;
            pending.clear();
        }
        self.scanned = pending.len();
        self.pending = pending;
        completed
    }

    /// Text received since the last completion.
    pub fn accumulated(&self) -> &str {
        &self.accumulator
    }

    /// Counters so far.
    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Ends the pass.
    ///
    /// A trailing fragment without a newline is not a frame and is dropped.
    pub fn finish(self) -> StreamReport {
        if !self.pending.is_empty() {
            tracing::debug!(
                bytes = self.pending.len(),
                "dropping unterminated trailing stream fragment"
            );
        }
        let outcome = if !self.accumulator.is_empty() {
            StreamOutcome::Partial {
                discarded: self.accumulator,
            }
        } else if self.stats.completions > 0 {
            StreamOutcome::Complete
        } else {
            StreamOutcome::Empty
        };
        StreamReport {
            outcome,
            stats: self.stats,
        }
    }

    fn feed_line(&mut self, line: &[u8]) -> Option<String> {
        if !line.starts_with(DATA_PREFIX.as_bytes()) {
            return None;
        }
        self.stats.frames += 1;
        let frame = match std::str::from_utf8(line) {
            Ok(line) => decode_frame(line),
            Err(_) => Frame::Malformed,
        };
        match frame {
            Frame::Delta(Some(text)) => {
                self.accumulator.push_str(&text);
                None
            }
            Frame::Stop => {
                self.stats.completions += 1;
                Some(std::mem::take(&mut self.accumulator))
            }
            Frame::Malformed => {
                self.stats.malformed += 1;
                None
            }
            Frame::Delta(None) | Frame::Other(_) | Frame::Ignored => None,
        }
    }
}

/// Decodes a response body, committing and displaying each reply.
///
/// For every `message_stop` the accumulated text is appended to `transcript`
/// as an assistant message and written, colorized, to `output`.  The pass ends
/// when the stream does; an error item from the stream aborts it and is
/// returned.  Replies committed before the error stay in the transcript.
pub async fn decode_stream<S>(
    mut stream: S,
    transcript: &mut Transcript,
    output: &mut dyn OutputSink,
    colorizer: &Colorizer,
) -> Result<StreamReport>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    let mut decoder = StreamDecoder::new();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                STREAM_ERRORS.click();
                return Err(err);
            }
        };
        STREAM_BYTES.count(chunk.len() as u64);
        for reply in decoder.push(&chunk) {
            STREAM_COMPLETIONS.click();
            let shown = colorizer.colorize(&reply).into_owned();
            transcript.push_assistant(reply);
            output.write_line(&shown).await?;
        }
    }

    let report = decoder.finish();
    STREAM_FRAMES.count(report.stats.frames as u64);
    STREAM_MALFORMED_FRAMES.count(report.stats.malformed as u64);
    match &report.outcome {
        StreamOutcome::Complete => {}
        StreamOutcome::Partial { discarded } => {
            STREAM_PARTIAL.click();
            tracing::warn!(
                discarded_bytes = discarded.len(),
                "stream ended before message_stop; partial reply dropped"
            );
        }
        StreamOutcome::Empty => {
            STREAM_PARTIAL.click();
            tracing::warn!(
                frames = report.stats.frames,
                "stream ended without a reply"
            );
        }
    }
    Ok(report)
}
