//! SSH server exposing the Claude-backed shell.
//!
//! # Usage
//!
//! ```bash
//! ssh-keygen -t ed25519 -N "" -f .ssh/term_info_ed25519
//! anthroshell-ssh --listen localhost:22020
//! ssh -p 22020 localhost
//! ```
//!
//! The configuration file is read once at startup.  If it cannot be read the
//! server does not start; if it has no API key, every session reports that
//! and closes.

use std::sync::Arc;

use arrrg::CommandLine;
use tracing_subscriber::EnvFilter;

use anthroshell::chat::{Colorizer, ShellConfig, SshArgs};
use anthroshell::ssh::{ShellServer, load_host_key};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (args, _) = SshArgs::from_command_line_relaxed("anthroshell-ssh [OPTIONS]");
    let config = ShellConfig::load(args.config_path())?;
    let transport = config.client();
    if let Err(err) = &transport {
        tracing::error!(error = %err, "sessions will be refused until the configuration is fixed");
    }
    let host_key = load_host_key(args.host_key_path())?;

    ShellServer::new(
        Arc::new(config),
        transport,
        Colorizer::with_color(!args.no_color),
    )
    .listen(args.listen_address(), host_key)
    .await?;
    Ok(())
}
