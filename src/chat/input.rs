//! Sources of user input lines.
//!
//! The chat loop reads through the [`LineSource`] trait.  The local terminal
//! uses rustyline ([`TerminalInput`]); an SSH channel delivers raw keystrokes,
//! which [`RawLineReader`] assembles into lines itself.

use std::collections::VecDeque;
use std::sync::mpsc as std_mpsc;
use std::thread;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::render::SharedWriter;

/// Supplies lines typed by the user.
#[async_trait::async_trait]
pub trait LineSource: Send {
    /// Shows `prompt` and waits for one line, without its line terminator.
    ///
    /// Returns `None` once the input has ended.
    async fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;
}

type ReadRequest = (String, oneshot::Sender<Result<Option<String>>>);

/// Line input from the local terminal with editing and history.
///
/// rustyline blocks, so the editor lives on its own thread and is driven over
/// a channel.  Ctrl+C at the prompt starts a fresh line; Ctrl+D ends input.
pub struct TerminalInput {
    requests: mpsc::UnboundedSender<ReadRequest>,
}

impl TerminalInput {
    /// Starts the editor thread.
    pub fn new() -> Result<Self> {
        let (requests, mut incoming) = mpsc::unbounded_channel::<ReadRequest>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();
        thread::Builder::new()
            .name("anthroshell-readline".to_string())
            .spawn(move || {
                let mut editor = match DefaultEditor::new() {
                    Ok(editor) => {
                        let _ = ready_tx.send(Ok(()));
                        editor
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err.into()));
                        return;
                    }
                };
                while let Some((prompt, reply)) = incoming.blocking_recv() {
                    let _ = reply.send(read_one(&mut editor, &prompt));
                }
            })
            .map_err(|err| Error::io("failed to start the input thread", err))?;
        ready_rx
            .recv()
            .map_err(|_| Error::input("input thread exited during startup"))??;
        Ok(Self { requests })
    }
}

fn read_one(editor: &mut DefaultEditor, prompt: &str) -> Result<Option<String>> {
    loop {
        match editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = editor.add_history_entry(line.as_str());
                }
                return Ok(Some(line));
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => return Ok(None),
            Err(err) => return Err(err.into()),
        }
    }
}

#[async_trait::async_trait]
impl LineSource for TerminalInput {
    async fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        let (reply, answer) = oneshot::channel();
        self.requests
            .send((prompt.to_string(), reply))
            .map_err(|_| Error::input("input thread has exited"))?;
        answer
            .await
            .map_err(|_| Error::input("input thread has exited"))?
    }
}

const CTRL_C: u8 = 0x03;
const CTRL_D: u8 = 0x04;
const BACKSPACE: u8 = 0x08;
const ESC: u8 = 0x1b;
const DEL: u8 = 0x7f;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escape {
    None,
    Esc,
    Csi,
}

enum Done {
    Line,
    End,
}

/// A minimal line editor over a raw byte stream.
///
/// Remote terminals send keystrokes one at a time and expect the server to
/// echo them.  Lines end at CR, LF or CRLF.  Backspace removes one character,
/// Ctrl+C ends input, Ctrl+D ends input on an empty line, and escape
/// sequences (arrow keys and the like) are discarded.
pub struct RawLineReader<R, W> {
    reader: R,
    writer: SharedWriter<W>,
    echo: bool,
    pending: VecDeque<u8>,
    escape: Escape,
    after_cr: bool,
    eof: bool,
}

impl<R, W> RawLineReader<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Reads from `reader`; prompts and echo go to `writer`.
    pub fn new(reader: R, writer: SharedWriter<W>, echo: bool) -> Self {
        Self {
            reader,
            writer,
            echo,
            pending: VecDeque::new(),
            escape: Escape::None,
            after_cr: false,
            eof: false,
        }
    }

    fn feed(&mut self, byte: u8, line: &mut Vec<u8>, echo: &mut Vec<u8>) -> Option<Done> {
        let after_cr = std::mem::replace(&mut self.after_cr, false);
        match self.escape {
            Escape::Esc => {
                self.escape = if byte == b'[' || byte == b'O' {
                    Escape::Csi
                } else {
                    Escape::None
                };
                return None;
            }
            Escape::Csi => {
                if (0x40..=0x7e).contains(&byte) {
                    self.escape = Escape::None;
                }
                return None;
            }
            Escape::None => {}
        }
        match byte {
            b'\r' => {
                self.after_cr = true;
                echo.extend_from_slice(b"\r\n");
                Some(Done::Line)
            }
            b'\n' if after_cr => None,
            b'\n' => {
                echo.extend_from_slice(b"\r\n");
                Some(Done::Line)
            }
            DEL | BACKSPACE => {
                if pop_char(line) {
                    echo.extend_from_slice(b"\x08 \x08");
                }
                None
            }
            CTRL_C => {
                echo.extend_from_slice(b"^C\r\n");
                Some(Done::End)
            }
            CTRL_D if line.is_empty() => Some(Done::End),
            ESC => {
                self.escape = Escape::Esc;
                None
            }
            b'\t' => {
                line.push(byte);
                echo.push(byte);
                None
            }
            b if b < 0x20 => None,
            b => {
                line.push(b);
                echo.push(b);
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl<R, W> LineSource for RawLineReader<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        if self.eof {
            return Ok(None);
        }
        {
            let mut writer = self.writer.lock().await;
            writer.write_all(prompt.as_bytes()).await?;
            writer.flush().await?;
        }

        let mut line = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let mut echo = Vec::new();
            let mut done = None;
            while done.is_none() {
                let Some(byte) = self.pending.pop_front() else {
                    break;
                };
                done = self.feed(byte, &mut line, &mut echo);
            }
            if self.echo && !echo.is_empty() {
                let mut writer = self.writer.lock().await;
                writer.write_all(&echo).await?;
                writer.flush().await?;
            }
            match done {
                Some(Done::Line) => return Ok(Some(String::from_utf8_lossy(&line).into_owned())),
                Some(Done::End) => {
                    self.eof = true;
                    return Ok(None);
                }
                None => {}
            }

            let n = self.reader.read(&mut buf).await?;
            if n == 0 {
                self.eof = true;
                if line.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
            self.pending.extend(&buf[..n]);
        }
    }
}

/// Removes the last UTF-8 character; false if the line was empty.
fn pop_char(line: &mut Vec<u8>) -> bool {
    let mut popped = false;
    while let Some(byte) = line.pop() {
        popped = true;
        if byte & 0xc0 != 0x80 {
            break;
        }
    }
    popped
}
