//! The SSH front end.
//!
//! Every connection that asks for a shell gets its own [`ChatLoop`] and
//! transcript.  Sessions share only the configuration and a clone of the
//! transport.  Authentication is not checked: any user name is let in.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use russh::server::{self, Auth, Msg, Session};
use russh::{Channel, ChannelId, Pty};
use russh_keys::key::{KeyPair, PublicKey};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

use crate::chat::{ChatLoop, RawLineReader, ShellConfig};
use crate::client::MessageTransport;
use crate::error::{Error, Result};
use crate::observability::{SSH_SESSION_ERRORS, SSH_SESSIONS};
use crate::render::{Colorizer, OutputSink, WriterSink};

/// Loads the server's private host key.
pub fn load_host_key<P: AsRef<Path>>(path: P) -> Result<KeyPair> {
    let path = path.as_ref();
    russh_keys::load_secret_key(path, None).map_err(|err| {
        Error::config(
            format!(
                "failed to load host key {}: {err} (create one with `ssh-keygen -t ed25519 -N \"\" -f {}`)",
                path.display(),
                path.display()
            ),
            None,
        )
    })
}

/// Runs one shell session over an established byte stream.
///
/// The stream is treated as a remote terminal: output line endings become
/// CRLF and, when `echo` is set, typed characters are echoed back.  If
/// `transport` is an error the session reports it and closes without reading
/// any input.
pub async fn serve_session<S, T>(
    stream: S,
    config: Arc<ShellConfig>,
    transport: Result<T>,
    colorizer: Colorizer,
    echo: bool,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
    T: MessageTransport,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut output = WriterSink::new(writer).with_crlf(true);

    let transport = match transport {
        Ok(transport) => transport,
        Err(err) => {
            output
                .write_line(&format!("Failed to load configuration: {err}"))
                .await?;
            output.shutdown().await?;
            return Err(err);
        }
    };

    let mut input = RawLineReader::new(reader, output.writer(), echo);
    let mut chat = ChatLoop::new(config, transport).with_colorizer(colorizer);
    let result = match chat.welcome(&mut output).await {
        Ok(()) => chat.run(&mut input, &mut output).await,
        Err(err) => Err(err),
    };
    let shutdown = output.shutdown().await;
    tracing::debug!(
        transcript = chat.transcript().len(),
        "shell session finished"
    );
    result.and(shutdown)
}

/// Accepts SSH connections and serves a shell on each.
pub struct ShellServer<T> {
    config: Arc<ShellConfig>,
    transport: Result<T>,
    colorizer: Colorizer,
}

impl<T> ShellServer<T>
where
    T: MessageTransport + Clone + 'static,
{
    /// Creates a server.
    ///
    /// `transport` is cloned into every session.  When it is an error, each
    /// session shows the error and closes.
    pub fn new(config: Arc<ShellConfig>, transport: Result<T>, colorizer: Colorizer) -> Self {
        Self {
            config,
            transport,
            colorizer,
        }
    }

    /// Listens on `address` until the listener fails.
    pub async fn listen(self, address: &str, host_key: KeyPair) -> Result<()> {
        let ssh_config = Arc::new(server::Config {
            keys: vec![host_key],
            ..Default::default()
        });
        let listener = TcpListener::bind(address)
            .await
            .map_err(|err| Error::io(format!("failed to bind {address}"), err))?;
        tracing::info!(address, "listening for SSH connections");

        loop {
            let (socket, peer) = listener.accept().await?;
            tracing::info!(%peer, "connection accepted");
            let handler = self.handler(peer);
            let ssh_config = Arc::clone(&ssh_config);
            tokio::spawn(async move {
                let result = match server::run_stream(ssh_config, socket, handler).await {
                    Ok(running) => running.await,
                    Err(err) => Err(err),
                };
                if let Err(err) = result {
                    SSH_SESSION_ERRORS.click();
                    tracing::warn!(%peer, error = %err, "connection ended with error");
                } else {
                    tracing::info!(%peer, "connection closed");
                }
            });
        }
    }

    fn handler(&self, peer: SocketAddr) -> ShellHandler<T> {
        ShellHandler {
            peer,
            config: Arc::clone(&self.config),
            transport: self.transport.clone(),
            colorizer: self.colorizer,
            channels: HashMap::new(),
            ptys: HashSet::new(),
        }
    }
}

/// Per-connection SSH state.
pub struct ShellHandler<T> {
    peer: SocketAddr,
    config: Arc<ShellConfig>,
    transport: Result<T>,
    colorizer: Colorizer,
    channels: HashMap<ChannelId, Channel<Msg>>,
    ptys: HashSet<ChannelId>,
}

impl<T> ShellHandler<T> {
    fn accept(&self, user: &str, method: &str) -> Auth {
        tracing::info!(peer = %self.peer, user, method, "authenticated");
        Auth::Accept
    }
}

#[async_trait::async_trait]
impl<T> server::Handler for ShellHandler<T>
where
    T: MessageTransport + Clone + 'static,
{
    type Error = russh::Error;

    async fn auth_none(&mut self, user: &str) -> std::result::Result<Auth, Self::Error> {
        Ok(self.accept(user, "none"))
    }

    async fn auth_password(
        &mut self,
        user: &str,
        _password: &str,
    ) -> std::result::Result<Auth, Self::Error> {
        Ok(self.accept(user, "password"))
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        _public_key: &PublicKey,
    ) -> std::result::Result<Auth, Self::Error> {
        Ok(self.accept(user, "publickey"))
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> std::result::Result<bool, Self::Error> {
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    #[allow(clippy::too_many_arguments)]
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        tracing::debug!(peer = %self.peer, term, col_width, row_height, "pty requested");
        self.ptys.insert(channel);
        let _ = session.channel_success(channel);
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        let Some(open) = self.channels.remove(&channel) else {
            let _ = session.channel_failure(channel);
            return Ok(());
        };
        let _ = session.channel_success(channel);
        SSH_SESSIONS.click();

        let echo = self.ptys.remove(&channel);
        let handle = session.handle();
        let peer = self.peer;
        let config = Arc::clone(&self.config);
        let transport = self.transport.clone();
        let colorizer = self.colorizer;
        tokio::spawn(async move {
            let stream = open.into_stream();
            let status = match serve_session(stream, config, transport, colorizer, echo).await {
                Ok(()) => 0,
                Err(err) => {
                    SSH_SESSION_ERRORS.click();
                    tracing::warn!(%peer, error = %err, "shell session failed");
                    1
                }
            };
            let _ = handle.exit_status_request(channel, status).await;
            let _ = handle.close(channel).await;
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_host_key_is_config_error() {
        let path = std::env::temp_dir().join("anthroshell-no-such-host-key");
        let err = load_host_key(&path).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("ssh-keygen"));
    }
}
