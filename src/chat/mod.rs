//! The interactive shell.
//!
//! This module provides the chat loop and everything it is parameterized
//! over:
//!
//! - [`config`]: the YAML configuration file and CLI arguments
//! - [`input`]: line sources for the local terminal and for raw byte streams
//! - [`session`]: the chat loop itself

mod config;
mod input;
mod session;

pub use crate::render::{Colorizer, OutputSink, WriterSink};
pub use config::{
    DEFAULT_CONFIG_PATH, DEFAULT_HOST_KEY_PATH, DEFAULT_LISTEN_ADDRESS, DEFAULT_MAX_TOKENS,
    DEFAULT_MODEL, DEFAULT_SHELL_PROMPT, DEFAULT_SYSTEM_PROMPT, ShellArgs, ShellConfig, SshArgs,
};
pub use input::{LineSource, RawLineReader, TerminalInput};
pub use session::{
    ChatLoop, ChatState, EXIT_COMMANDS, FAREWELL, TurnOutcome, WELCOME, is_exit_command,
};
