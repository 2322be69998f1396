//! Output rendering for the shell.
//!
//! Replies and errors are marked up with lightweight tags (`<cmd>…</cmd>`,
//! `<error>…</error>`) which the [`Colorizer`] turns into ANSI colors just
//! before display.  Text reaches the user through an [`OutputSink`], which is
//! stdout for the local terminal and the channel for an SSH session.

use std::borrow::Cow;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error::Result;

/// ANSI escape code for cyan text (used for echoed commands).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(/?)(\w+)>").expect("tag pattern should compile"));

/// Wraps `text` in a tag pair, e.g. `tag("cmd", "ls")` gives `<cmd>ls</cmd>`.
pub fn tag(name: &str, text: &str) -> String {
    format!("<{name}>{text}</{name}>")
}

/// Replaces display tags with ANSI colors.
///
/// `cmd` content is cyan and `error` content is red.  Any other pair is
/// stripped to its content.  Pairs may nest and are resolved innermost first.
/// A closing tag with no matching opening tag, and an opening tag that is
/// never closed, are left as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Colorizer {
    use_color: bool,
}

impl Colorizer {
    /// Creates a colorizer with ANSI colors enabled.
    pub fn new() -> Self {
        Self { use_color: true }
    }

    /// Creates a colorizer with the specified color setting.
    ///
    /// With colors disabled every matched tag pair is stripped.
    pub fn with_color(use_color: bool) -> Self {
        Self { use_color }
    }

    /// Whether ANSI escapes are emitted.
    pub fn use_color(&self) -> bool {
        self.use_color
    }

    /// Renders the tags in `text`.
    pub fn colorize<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if !TAG.is_match(text) {
            return Cow::Borrowed(text);
        }
        let mut out = String::with_capacity(text.len());
        // Open tags not yet closed: name and offset of the tag in `out`.
        let mut open: Vec<(&str, usize)> = Vec::new();
        let mut last = 0;
        for caps in TAG.captures_iter(text) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(2)) else {
                continue;
            };
            let name = name.as_str();
            out.push_str(&text[last..whole.start()]);
            last = whole.end();
            if caps[1].is_empty() {
                open.push((name, out.len()));
                out.push_str(whole.as_str());
                continue;
            }
            match open.iter().rposition(|(n, _)| *n == name) {
                Some(index) => {
                    let start = open[index].1;
                    open.truncate(index);
                    let content = out.split_off(start + name.len() + 2);
                    out.truncate(start);
                    self.paint(name, &content, &mut out);
                }
                None => out.push_str(whole.as_str()),
            }
        }
        out.push_str(&text[last..]);
        Cow::Owned(out)
    }

    fn paint(&self, name: &str, content: &str, out: &mut String) {
        let color = match (self.use_color, name) {
            (true, "cmd") => ANSI_CYAN,
            (true, "error") => ANSI_RED,
            _ => {
                out.push_str(content);
                return;
            }
        };
        out.push_str(color);
        out.push_str(content);
        out.push_str(ANSI_RESET);
    }
}

impl Default for Colorizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Where the shell writes what the user sees.
#[async_trait::async_trait]
pub trait OutputSink: Send {
    /// Write `text` as is and make it visible immediately.
    async fn write_str(&mut self, text: &str) -> Result<()>;

    /// Write `text` followed by a newline.
    async fn write_line(&mut self, text: &str) -> Result<()> {
        self.write_str(text).await?;
        self.write_str("\n").await
    }
}

/// A writer that may be shared between the output sink and an echoing input
/// source.
pub type SharedWriter<W> = Arc<Mutex<W>>;

/// An [`OutputSink`] over any async writer.
///
/// With `crlf` enabled every bare `\n` is sent as `\r\n`, which a remote
/// terminal in raw mode needs to return the cursor to column zero.
pub struct WriterSink<W> {
    writer: SharedWriter<W>,
    crlf: bool,
}

impl<W: AsyncWrite + Unpin + Send> WriterSink<W> {
    /// Creates a sink that owns `writer`.
    pub fn new(writer: W) -> Self {
        Self::shared(Arc::new(Mutex::new(writer)))
    }

    /// Creates a sink over a writer that is shared with someone else.
    pub fn shared(writer: SharedWriter<W>) -> Self {
        Self {
            writer,
            crlf: false,
        }
    }

    /// Enables or disables `\n` to `\r\n` translation.
    pub fn with_crlf(mut self, crlf: bool) -> Self {
        self.crlf = crlf;
        self
    }

    /// Returns a handle to the underlying writer.
    pub fn writer(&self) -> SharedWriter<W> {
        Arc::clone(&self.writer)
    }

    /// Flushes and shuts down the underlying writer.
    pub async fn shutdown(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.flush().await?;
        writer.shutdown().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl<W: AsyncWrite + Unpin + Send> OutputSink for WriterSink<W> {
    async fn write_str(&mut self, text: &str) -> Result<()> {
        let text = if self.crlf {
            to_crlf(text)
        } else {
            Cow::Borrowed(text)
        };
        let mut writer = self.writer.lock().await;
        writer.write_all(text.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Converts bare `\n` line endings to `\r\n`, leaving existing `\r\n` alone.
pub fn to_crlf(text: &str) -> Cow<'_, str> {
    if !text.contains('\n') {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    let mut prev = '\0';
    for c in text.chars() {
        if c == '\n' && prev != '\r' {
            out.push('\r');
        }
        out.push(c);
        prev = c;
    }
    Cow::Owned(out)
}
