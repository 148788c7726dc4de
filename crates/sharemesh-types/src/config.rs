//! Server configuration loaded from `~/.sharemesh/config.toml` with defaults.

use crate::error::{SharemeshError, SharemeshResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default plain listening port.
pub const DEFAULT_PORT: u16 = 3000;
/// Default secured listening port.
pub const DEFAULT_SECURE_PORT: u16 = 3781;

/// PEM files for the secured transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Certificate chain presented by this server (and by it as a client).
    pub cert_path: PathBuf,
    /// Private key matching `cert_path`.
    pub key_path: PathBuf,
    /// CA bundle trusted for peers and clients.
    pub ca_path: PathBuf,
}

/// Configuration consumed by the server core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Hostname advertised to peers as part of this server's address.
    pub advertised_hostname: String,
    /// Interface the listeners bind to.
    pub bind_address: String,
    /// Plain listening port.
    pub port: u16,
    /// Secured listening port.
    pub secure_port: u16,
    /// Shared secret required by SHARE.
    pub secret: String,
    /// Minimum seconds between accepted connections from one IP. 0 disables.
    pub connection_interval_secs: u64,
    /// Seconds between gossip rounds.
    pub exchange_interval_secs: u64,
    /// Socket read timeout in seconds.
    pub read_timeout_secs: u64,
    /// Concurrent connections served per listener.
    pub max_connections: usize,
    /// Secured transport credentials. The secured listener is disabled without them.
    pub tls: Option<TlsConfig>,
    /// Verbose logging.
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            advertised_hostname: "localhost".to_string(),
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            secure_port: DEFAULT_SECURE_PORT,
            secret: uuid::Uuid::new_v4().to_string(),
            connection_interval_secs: 1,
            exchange_interval_secs: 600,
            read_timeout_secs: 300,
            max_connections: 50,
            tls: None,
            debug: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    ///
    /// A missing or unreadable file is not an error: the problem is logged
    /// and the defaults are used.
    pub fn load(path: Option<&Path>) -> Self {
        let config_path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(default_config_path);

        if !config_path.exists() {
            info!(path = %config_path.display(), "Config file not found, using defaults");
            return Self::default();
        }

        match Self::from_file(&config_path) {
            Ok(config) => {
                info!(path = %config_path.display(), "Loaded configuration");
                config
            }
            Err(e) => {
                warn!(
                    error = %e,
                    path = %config_path.display(),
                    "Failed to load config, using defaults"
                );
                Self::default()
            }
        }
    }

    /// Read and parse a TOML configuration file.
    pub fn from_file(path: &Path) -> SharemeshResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| SharemeshError::Config(e.to_string()))
    }

    /// Minimum spacing between connections accepted from one IP.
    pub fn connection_interval(&self) -> Duration {
        Duration::from_secs(self.connection_interval_secs)
    }

    /// Gossip round period.
    pub fn exchange_interval(&self) -> Duration {
        Duration::from_secs(self.exchange_interval_secs)
    }

    /// Socket read timeout.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// `~/.sharemesh/config.toml`, or `./config.toml` without a home directory.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".sharemesh"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.toml")
}
