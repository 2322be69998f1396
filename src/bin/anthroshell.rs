//! Interactive shell backed by Claude, on the local terminal.
//!
//! # Usage
//!
//! ```bash
//! # Use ./config.yaml, prompting for an API key if it has none
//! anthroshell
//!
//! # Use another configuration file and disable colors
//! anthroshell --config ~/.anthroshell.yaml --no-color
//! ```
//!
//! Type `exit` or `quit` to leave.  Set `RUST_LOG=debug` to see request and
//! stream diagnostics on stderr.

use std::path::Path;
use std::sync::Arc;

use arrrg::CommandLine;
use tracing_subscriber::EnvFilter;

use anthroshell::Error;
use anthroshell::chat::{
    ChatLoop, Colorizer, LineSource, ShellArgs, ShellConfig, TerminalInput, WriterSink,
};

/// Main entry point for the anthroshell application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (args, _) = ShellArgs::from_command_line_relaxed("anthroshell [OPTIONS]");
    let path = args.config_path();
    let mut input = TerminalInput::new()?;
    let config = load_or_prompt(&path, &mut input).await?;
    let client = config.client()?;

    let mut output = WriterSink::new(tokio::io::stdout());
    let mut chat = ChatLoop::new(Arc::new(config), client)
        .with_colorizer(Colorizer::with_color(!args.no_color));
    chat.welcome(&mut output).await?;
    chat.run(&mut input, &mut output).await?;
    Ok(())
}

/// Loads the configuration, asking for an API key when there is none.
///
/// A key entered here is written back to `path`.
async fn load_or_prompt(path: &Path, input: &mut TerminalInput) -> Result<ShellConfig, Error> {
    let mut config = match ShellConfig::load(path) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(error = %err, "starting from the default configuration");
            println!("Failed to load configuration: {err}");
            ShellConfig::new()
        }
    };
    if config.require_api_key().is_ok() {
        return Ok(config);
    }

    loop {
        let Some(key) = input.read_line("Enter your Anthropic API key: ").await? else {
            return Err(Error::config("no API key entered", None));
        };
        let key = key.trim();
        if !key.is_empty() {
            config = config.with_api_key(key);
            break;
        }
    }
    config.save(path)?;
    println!("API key saved to {}", path.display());
    Ok(config)
}
