//! Configuration types for the shell.
//!
//! This module provides the YAML configuration file, CLI argument parsing via
//! `arrrg`, and the defaults both fall back to.

use std::path::{Path, PathBuf};

use arrrg_derive::CommandLine;
use serde::{Deserialize, Serialize};

use crate::client::Anthropic;
use crate::error::{Error, Result};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Default model.
pub const DEFAULT_MODEL: &str = "claude-3-opus-20240229";

/// Default system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "Assistant is in a CLI mood today.";

/// Default shell prompt.
pub const DEFAULT_SHELL_PROMPT: &str = "$> ";

/// Default maximum tokens per response.
pub const DEFAULT_MAX_TOKENS: u32 = 256;

/// Default address for the SSH listener.
pub const DEFAULT_LISTEN_ADDRESS: &str = "localhost:22020";

/// Default host key for the SSH listener.
pub const DEFAULT_HOST_KEY_PATH: &str = ".ssh/term_info_ed25519";

/// Command-line arguments for the local terminal shell.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ShellArgs {
    /// Path of the YAML configuration file.
    #[arrrg(optional, "Configuration file (default: config.yaml)", "PATH")]
    pub config: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

impl ShellArgs {
    /// The configuration file to use.
    pub fn config_path(&self) -> PathBuf {
        PathBuf::from(self.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH))
    }
}

/// Command-line arguments for the SSH server.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct SshArgs {
    /// Path of the YAML configuration file.
    #[arrrg(optional, "Configuration file (default: config.yaml)", "PATH")]
    pub config: Option<String>,

    /// Address to listen on.
    #[arrrg(optional, "Listen address (default: localhost:22020)", "ADDR")]
    pub listen: Option<String>,

    /// Path of the ed25519 host key.
    #[arrrg(optional, "Host key (default: .ssh/term_info_ed25519)", "PATH")]
    pub host_key: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

impl SshArgs {
    /// The configuration file to use.
    pub fn config_path(&self) -> PathBuf {
        PathBuf::from(self.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH))
    }

    /// The address to listen on.
    pub fn listen_address(&self) -> &str {
        self.listen.as_deref().unwrap_or(DEFAULT_LISTEN_ADDRESS)
    }

    /// The host key file.
    pub fn host_key_path(&self) -> PathBuf {
        PathBuf::from(self.host_key.as_deref().unwrap_or(DEFAULT_HOST_KEY_PATH))
    }
}

/// The contents of the configuration file.
///
/// Empty or absent fields take their defaults when loaded, so a file holding
/// only `api_key` is complete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShellConfig {
    /// API key sent as `x-api-key`.
    #[serde(default)]
    pub api_key: String,

    /// Model identifier.
    #[serde(default)]
    pub model: String,

    /// System prompt sent with every request.
    #[serde(default)]
    pub system_prompt: String,

    /// Prompt shown before each line of input.
    #[serde(default)]
    pub shell_prompt: String,

    /// Maximum tokens per response.
    #[serde(default)]
    pub max_tokens: u32,

    /// Turn non-success HTTP responses into errors instead of decoding them.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub strict_status: bool,

    /// Override for the API base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl ShellConfig {
    /// Creates a configuration with every default and no API key.
    pub fn new() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            shell_prompt: DEFAULT_SHELL_PROMPT.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            strict_status: false,
            api_url: None,
        }
    }

    /// Loads a configuration file and fills in defaults.
    ///
    /// An empty file is the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| {
            Error::config(
                format!("failed to read {}: {err}", path.display()),
                Some(Box::new(err)),
            )
        })?;
        if content.trim().is_empty() {
            return Ok(Self::new());
        }
        let config: Self = serde_yaml::from_str(&content).map_err(|err| {
            Error::config(
                format!("failed to parse {}: {err}", path.display()),
                Some(Box::new(err)),
            )
        })?;
        Ok(config.with_defaults())
    }

    /// Writes the configuration as YAML.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|err| Error::io("failed to create configuration directory", err))?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)
            .map_err(|err| Error::io("failed to write configuration file", err))
    }

    /// Replaces empty fields with their defaults.
    pub fn with_defaults(mut self) -> Self {
        if self.model.is_empty() {
            self.model = DEFAULT_MODEL.to_string();
        }
        if self.system_prompt.is_empty() {
            self.system_prompt = DEFAULT_SYSTEM_PROMPT.to_string();
        }
        if self.shell_prompt.is_empty() {
            self.shell_prompt = DEFAULT_SHELL_PROMPT.to_string();
        }
        if self.max_tokens == 0 {
            self.max_tokens = DEFAULT_MAX_TOKENS;
        }
        self
    }

    /// Sets the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Sets the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Sets the shell prompt.
    pub fn with_shell_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.shell_prompt = prompt.into();
        self
    }

    /// Sets the maximum tokens per response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Returns the API key, or a configuration error if none is set.
    pub fn require_api_key(&self) -> Result<&str> {
        let key = self.api_key.trim();
        if key.is_empty() {
            Err(Error::config("api_key is not set", None))
        } else {
            Ok(key)
        }
    }

    /// Builds the API client this configuration describes.
    pub fn client(&self) -> Result<Anthropic> {
        Anthropic::with_options(
            self.require_api_key()?,
            self.api_url.clone(),
            self.strict_status,
        )
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self::new()
    }
}
