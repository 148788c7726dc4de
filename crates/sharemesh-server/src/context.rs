//! State shared by every connection handler and background task.

use crate::directory::PeerDirectory;
use crate::registry::ResourceRegistry;
use crate::subscription::SubscriptionHub;
use sharemesh_types::{PeerAddress, ServerConfig};
use sharemesh_wire::{ConnectionRateLimiter, Transport};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Which listener a connection arrived on. Peer directories, gossip and
/// relaying are kept separate per mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Plain,
    Secure,
}

impl Mode {
    pub fn is_secure(self) -> bool {
        matches!(self, Mode::Secure)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Plain => write!(f, "plain"),
            Mode::Secure => write!(f, "secure"),
        }
    }
}

/// Per-mode endpoint: the peer directory and the transport used to reach
/// peers in it.
struct Endpoint {
    directory: PeerDirectory,
    transport: Option<Arc<dyn Transport>>,
}

/// Everything a request handler needs.
pub struct ServerContext {
    pub config: ServerConfig,
    pub registry: ResourceRegistry,
    pub subscriptions: SubscriptionHub,
    pub rate_limiter: ConnectionRateLimiter,
    plain: Endpoint,
    secure: Endpoint,
}

impl ServerContext {
    /// Build a context. `plain_port` and `secure_port` are the ports this
    /// server advertises for itself; `secure_transport` is `None` when the
    /// secured listener is not running.
    pub fn new(
        config: ServerConfig,
        plain_port: u16,
        secure_port: u16,
        plain_transport: Arc<dyn Transport>,
        secure_transport: Option<Arc<dyn Transport>>,
    ) -> Self {
        let host = config.advertised_hostname.clone();
        let rate_limiter = ConnectionRateLimiter::new(config.connection_interval());
        Self {
            registry: ResourceRegistry::new(),
            subscriptions: SubscriptionHub::new(),
            rate_limiter,
            plain: Endpoint {
                directory: PeerDirectory::new(PeerAddress::new(host.clone(), plain_port)),
                transport: Some(plain_transport),
            },
            secure: Endpoint {
                directory: PeerDirectory::new(PeerAddress::new(host, secure_port)),
                transport: secure_transport,
            },
            config,
        }
    }

    fn endpoint(&self, mode: Mode) -> &Endpoint {
        match mode {
            Mode::Plain => &self.plain,
            Mode::Secure => &self.secure,
        }
    }

    /// Peer directory for `mode`.
    pub fn directory(&self, mode: Mode) -> &PeerDirectory {
        &self.endpoint(mode).directory
    }

    /// This server's own address for `mode`.
    pub fn own_address(&self, mode: Mode) -> &PeerAddress {
        self.directory(mode).own()
    }

    /// Transport for outbound connections in `mode`, if that mode is active.
    pub fn transport(&self, mode: Mode) -> Option<Arc<dyn Transport>> {
        self.endpoint(mode).transport.clone()
    }

    pub fn read_timeout(&self) -> Duration {
        self.config.read_timeout()
    }
}

impl fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerContext")
            .field("plain", self.own_address(Mode::Plain))
            .field("secure", self.own_address(Mode::Secure))
            .field("resources", &self.registry.len())
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}
