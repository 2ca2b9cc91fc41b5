//! Activation configuration for kismet server connections.
//!
//! Settings can be loaded from `~/.config/kismet-bridge/config.toml` on
//! Linux (or the platform-appropriate location on other OSes), or built
//! programmatically. A configuration must validate successfully before
//! a connection worker is constructed from it.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::PathBuf;

/// Default kismet server name.
pub const DEFAULT_SERVER_NAME: &str = "localhost";

/// Default kismet server port.
pub const DEFAULT_PORT: u16 = 2501;

/// Configuration for one kismet server connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ActivationConfig {
    /// Kismet server hostname.
    pub server_name: String,

    /// Kismet server port.
    pub port: u16,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            server_name: DEFAULT_SERVER_NAME.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl fmt::Display for ActivationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.server_name, self.port)
    }
}

impl ActivationConfig {
    /// Create a configuration for the given server.
    pub fn with_server(server_name: impl Into<String>, port: u16) -> Self {
        Self {
            server_name: server_name.into(),
            port,
        }
    }

    /// Load configuration from the default config file location.
    ///
    /// Returns the default config if the file doesn't exist.
    /// Returns an error if the file exists but is malformed.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => {
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                toml::from_str(&content)
                    .with_context(|| format!("Invalid TOML in config file: {}", path.display()))
            }
            _ => Ok(Self::default()),
        }
    }

    /// Returns the path to the config file.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("kismet-bridge/config.toml"))
    }

    /// Validate the configuration.
    ///
    /// The server name must be non-empty and the port must fall in the
    /// range 1-65535.
    pub fn validate(&self) -> Result<()> {
        if self.server_name.trim().is_empty() {
            bail!("server_name must not be empty");
        }
        if self.port == 0 {
            bail!("Invalid port {}", self.port);
        }
        Ok(())
    }
}
