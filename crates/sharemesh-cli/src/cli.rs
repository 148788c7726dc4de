//! Clap CLI definitions for sharemesh.

use clap::{ArgGroup, Args, Parser, Subcommand};
use sharemesh_types::{PeerAddress, ServerConfig, TlsConfig};
use std::path::PathBuf;

/// sharemesh: a gossiping directory of shared resources.
#[derive(Parser)]
#[command(name = "sharemesh", version, about)]
pub struct Cli {
    /// Print debug-level logs, including every frame sent and received.
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a server.
    Serve(ServeArgs),
    /// Send one request to a server and print the replies.
    Client(ClientArgs),
}

/// Certificate material for the secured transport.
#[derive(Args, Debug, Default)]
pub struct TlsArgs {
    /// PEM certificate chain presented to peers.
    #[arg(long, requires_all = ["tls_key", "tls_ca"])]
    pub tls_cert: Option<PathBuf>,
    /// PEM private key for the certificate.
    #[arg(long, requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,
    /// PEM CA bundle used to verify peers.
    #[arg(long, requires = "tls_cert")]
    pub tls_ca: Option<PathBuf>,
}

impl TlsArgs {
    pub fn to_config(&self) -> Option<TlsConfig> {
        Some(TlsConfig {
            cert_path: self.tls_cert.clone()?,
            key_path: self.tls_key.clone()?,
            ca_path: self.tls_ca.clone()?,
        })
    }
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Path to a TOML config file (default: ~/.sharemesh/config.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Hostname advertised to other servers.
    #[arg(long)]
    pub advertised_hostname: Option<String>,
    /// Minimum seconds between connections from one IP (0 disables).
    #[arg(long)]
    pub connection_interval_limit: Option<u64>,
    /// Seconds between gossip rounds.
    #[arg(long)]
    pub exchange_interval: Option<u64>,
    /// Plain listening port.
    #[arg(long)]
    pub port: Option<u16>,
    /// Secured listening port.
    #[arg(long)]
    pub sport: Option<u16>,
    /// Shared secret required by SHARE.
    #[arg(long)]
    pub secret: Option<String>,
    #[command(flatten)]
    pub tls: TlsArgs,
}

impl ServeArgs {
    /// Overlay command-line values on a loaded config.
    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.advertised_hostname {
            config.advertised_hostname = host.clone();
        }
        if let Some(secs) = self.connection_interval_limit {
            config.connection_interval_secs = secs;
        }
        if let Some(secs) = self.exchange_interval {
            config.exchange_interval_secs = secs;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(port) = self.sport {
            config.secure_port = port;
        }
        if let Some(secret) = &self.secret {
            config.secret = secret.clone();
        }
        if let Some(tls) = self.tls.to_config() {
            config.tls = Some(tls);
        }
    }
}

#[derive(Args, Debug, Default)]
#[command(group(
    ArgGroup::new("operation")
        .required(true)
        .args(["publish", "remove", "share", "query", "fetch", "exchange", "subscribe"]),
))]
pub struct ClientArgs {
    /// Publish a resource with a non-file URI.
    #[arg(long)]
    pub publish: bool,
    /// Remove a resource.
    #[arg(long)]
    pub remove: bool,
    /// Share a file on the server's host (needs --secret).
    #[arg(long)]
    pub share: bool,
    /// Query resources.
    #[arg(long)]
    pub query: bool,
    /// Download a shared file into the current directory.
    #[arg(long)]
    pub fetch: bool,
    /// Tell the server about other servers (needs --servers).
    #[arg(long)]
    pub exchange: bool,
    /// Stream matching resources until Enter is pressed.
    #[arg(long)]
    pub subscribe: bool,

    /// Server host.
    #[arg(long, default_value = "localhost")]
    pub host: String,
    /// Server port (default: 3000, or 3781 with --secure).
    #[arg(long)]
    pub port: Option<u16>,
    /// Connect over the secured transport.
    #[arg(long)]
    pub secure: bool,

    /// Resource name.
    #[arg(long, default_value = "")]
    pub name: String,
    /// Resource description.
    #[arg(long, default_value = "")]
    pub description: String,
    /// Comma-separated tags.
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,
    /// Resource URI.
    #[arg(long, default_value = "")]
    pub uri: String,
    /// Resource channel.
    #[arg(long, default_value = "")]
    pub channel: String,
    /// Resource owner.
    #[arg(long, default_value = "")]
    pub owner: String,

    /// Comma-separated host:port list for --exchange.
    #[arg(long, value_delimiter = ',')]
    pub servers: Vec<PeerAddress>,
    /// Server secret for --share.
    #[arg(long)]
    pub secret: Option<String>,
    /// Ask the server to forward QUERY/SUBSCRIBE to its peers.
    #[arg(long)]
    pub relay: bool,
    /// Subscription id (default: random).
    #[arg(long)]
    pub id: Option<String>,

    #[command(flatten)]
    pub tls: TlsArgs,
}
