//! The chat loop.
//!
//! A [`ChatLoop`] owns one session's transcript and drives the cycle of
//! reading a line, sending the whole conversation, and streaming the reply
//! back.  It is written against [`LineSource`], [`OutputSink`] and
//! [`MessageTransport`] so the same loop serves the local terminal and SSH.

use std::sync::Arc;
use std::time::Instant;

use crate::chat::config::ShellConfig;
use crate::chat::input::LineSource;
use crate::client::MessageTransport;
use crate::error::{Error, Result};
use crate::observability::{CHAT_TURN_DURATION, CHAT_TURN_FAILURES, CHAT_TURNS};
use crate::render::{Colorizer, OutputSink, tag};
use crate::sse::{StreamReport, decode_stream};
use crate::transcript::Transcript;

/// Lines that end the session.  Matching is exact and case-sensitive.
pub const EXIT_COMMANDS: [&str; 2] = ["exit", "quit"];

/// Printed when the session ends.
pub const FAREWELL: &str = "Terminating session. Shutting down....";

/// Printed when a session starts.
pub const WELCOME: &str = "Welcome to the anthropic quantum reality interface!\n\n\n\
To get started type a command: help, ls, etc.\n\
Type 'exit' or 'quit' to end the session.\n";

/// Returns true if `line` ends the session.
pub fn is_exit_command(line: &str) -> bool {
    EXIT_COMMANDS.contains(&line)
}

/// Where the loop is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    /// Waiting for the next line.
    AwaitingInput,
    /// The request is being sent.
    Sending,
    /// The reply is being decoded.
    StreamingResponse,
    /// The session is over.
    Exiting,
}

/// What one line of input led to.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// The line was an exit command.
    Exit,
    /// The request went through and its reply stream was decoded.
    Answered(StreamReport),
    /// The request failed; the error was shown and the user message kept.
    Failed(Error),
}

/// One session's conversation with the model.
pub struct ChatLoop<T: MessageTransport> {
    config: Arc<ShellConfig>,
    transport: T,
    transcript: Transcript,
    colorizer: Colorizer,
    state: ChatState,
}

impl<T: MessageTransport> ChatLoop<T> {
    /// Creates a loop with an empty transcript and colors enabled.
    pub fn new(config: Arc<ShellConfig>, transport: T) -> Self {
        Self {
            config,
            transport,
            transcript: Transcript::new(),
            colorizer: Colorizer::new(),
            state: ChatState::AwaitingInput,
        }
    }

    /// Replaces the colorizer.
    pub fn with_colorizer(mut self, colorizer: Colorizer) -> Self {
        self.colorizer = colorizer;
        self
    }

    /// The conversation so far.
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// The current state.
    pub fn state(&self) -> ChatState {
        self.state
    }

    /// The configuration this loop was built with.
    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// Prints the welcome banner.
    pub async fn welcome(&self, output: &mut dyn OutputSink) -> Result<()> {
        output.write_line(WELCOME).await
    }

    /// Runs until an exit command or the end of input.
    ///
    /// Transport failures are shown and the loop carries on.  Errors writing
    /// output or reading input end the loop and are returned.
    pub async fn run(
        &mut self,
        input: &mut dyn LineSource,
        output: &mut dyn OutputSink,
    ) -> Result<()> {
        loop {
            self.state = ChatState::AwaitingInput;
            let Some(line) = input.read_line(&self.config.shell_prompt).await? else {
                tracing::debug!("input ended");
                self.state = ChatState::Exiting;
                output.write_line(FAREWELL).await?;
                return Ok(());
            };
            if let TurnOutcome::Exit = self.step(&line, output).await? {
                return Ok(());
            }
        }
    }

    /// Handles one line of input.
    pub async fn step(&mut self, line: &str, output: &mut dyn OutputSink) -> Result<TurnOutcome> {
        if is_exit_command(line) {
            self.state = ChatState::Exiting;
            output.write_line(FAREWELL).await?;
            return Ok(TurnOutcome::Exit);
        }

        CHAT_TURNS.click();
        let start = Instant::now();
        self.transcript.push_user(tag("cmd", line));
        self.state = ChatState::Sending;
        let payload = self.transcript.to_payload(
            &self.config.model,
            self.config.max_tokens,
            &self.config.system_prompt,
        );
        tracing::debug!(
            model = %payload.model,
            messages = payload.messages.len(),
            "sending request"
        );

        let stream = match self.transport.open_stream(&payload).await {
            Ok(stream) => stream,
            Err(err) => return self.fail(err, output).await,
        };

        self.state = ChatState::StreamingResponse;
        let report =
            match decode_stream(stream, &mut self.transcript, output, &self.colorizer).await {
                Ok(report) => report,
                Err(err) if err.is_transport() => return self.fail(err, output).await,
                Err(err) => return Err(err),
            };

        CHAT_TURN_DURATION.add(start.elapsed().as_secs_f64());
        tracing::debug!(
            completions = report.stats.completions,
            malformed = report.stats.malformed,
            transcript = self.transcript.len(),
            "turn finished"
        );
        self.state = ChatState::AwaitingInput;
        Ok(TurnOutcome::Answered(report))
    }

    async fn fail(&mut self, err: Error, output: &mut dyn OutputSink) -> Result<TurnOutcome> {
        CHAT_TURN_FAILURES.click();
        tracing::warn!(error = %err, "turn failed");
        let message = tag("error", &format!("Error: {err}"));
        output.write_line(&self.colorizer.colorize(&message)).await?;
        self.state = ChatState::AwaitingInput;
        Ok(TurnOutcome::Failed(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ByteStream;
    use crate::render::WriterSink;
    use crate::types::RequestPayload;

    struct Unreachable;

    #[async_trait::async_trait]
    impl MessageTransport for Unreachable {
        async fn open_stream(&self, _: &RequestPayload) -> Result<ByteStream> {
            Err(Error::connection("connection refused", None))
        }
    }

    fn chat() -> ChatLoop<Unreachable> {
        ChatLoop::new(Arc::new(ShellConfig::new()), Unreachable)
            .with_colorizer(Colorizer::with_color(false))
    }

    #[test]
    fn exit_commands() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command("quit"));
        assert!(!is_exit_command("Exit"));
        assert!(!is_exit_command("exit "));
        assert!(!is_exit_command("q"));
    }

    #[tokio::test]
    async fn exit_does_not_touch_transcript() {
        let mut chat = chat();
        let mut sink = WriterSink::new(Vec::new());
        let outcome = chat.step("quit", &mut sink).await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Exit));
        assert!(chat.transcript().is_empty());
        assert_eq!(chat.state(), ChatState::Exiting);
    }

    #[tokio::test]
    async fn failure_keeps_user_message() {
        let mut chat = chat();
        let mut sink = WriterSink::new(Vec::new());
        let outcome = chat.step("ls", &mut sink).await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Failed(Error::Connection { .. })));
        assert_eq!(chat.transcript().len(), 1);
        assert_eq!(chat.transcript().last().unwrap().content, "<cmd>ls</cmd>");
        assert_eq!(chat.state(), ChatState::AwaitingInput);

        let writer = sink.writer();
        let shown = writer.lock().await;
        assert_eq!(
            String::from_utf8_lossy(&shown),
            "Error: Connection error: connection refused\n"
        );
    }

    #[tokio::test]
    async fn welcome_banner() {
        let chat = chat();
        let mut sink = WriterSink::new(Vec::new());
        chat.welcome(&mut sink).await.unwrap();
        let writer = sink.writer();
        let shown = writer.lock().await;
        assert!(String::from_utf8_lossy(&shown).contains("Type 'exit' or 'quit'"));
    }
}
