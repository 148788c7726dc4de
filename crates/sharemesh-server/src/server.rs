//! Server startup and lifecycle.

use crate::context::{Mode, ServerContext};
use crate::error::{ServerError, ServerResult};
use crate::gossip;
use crate::listener::{accept_loop, report_disabled};
use sharemesh_types::ServerConfig;
use sharemesh_wire::{PlainTransport, TlsTransport, Transport};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Entry point for starting a server.
pub struct Server;

impl Server {
    /// Start a server with the transports described by `config`.
    ///
    /// The secured listener runs only when TLS credentials are configured
    /// and load successfully.
    pub async fn start(config: ServerConfig) -> ServerResult<RunningServer> {
        let secure: Option<Arc<dyn Transport>> = match &config.tls {
            Some(tls) => match TlsTransport::from_config(tls) {
                Ok(transport) => Some(Arc::new(transport)),
                Err(e) => {
                    warn!(error = %e, "Failed to load TLS credentials");
                    None
                }
            },
            None => None,
        };
        Self::start_with(config, Arc::new(PlainTransport), secure).await
    }

    /// Start a server with explicit transports.
    pub async fn start_with(
        config: ServerConfig,
        plain_transport: Arc<dyn Transport>,
        secure_transport: Option<Arc<dyn Transport>>,
    ) -> ServerResult<RunningServer> {
        let plain_listener = bind(&config.bind_address, config.port).await?;
        let plain_addr = plain_listener.local_addr()?;

        let secure_listener = match &secure_transport {
            Some(_) => Some(bind(&config.bind_address, config.secure_port).await?),
            None => {
                report_disabled(Mode::Secure, "no TLS credentials");
                None
            }
        };
        let secure_addr = match &secure_listener {
            Some(listener) => Some(listener.local_addr()?),
            None => None,
        };

        let connection_interval = config.connection_interval();
        let ctx = Arc::new(ServerContext::new(
            config.clone(),
            plain_addr.port(),
            secure_addr.map_or(config.secure_port, |a| a.port()),
            Arc::clone(&plain_transport),
            secure_transport.clone(),
        ));

        info!(
            address = %ctx.own_address(Mode::Plain),
            secure = %ctx.own_address(Mode::Secure),
            "Server started"
        );
        info!(secret = %config.secret, "Using secret");

        let mut tasks = vec![
            tokio::spawn(accept_loop(
                plain_listener,
                Arc::clone(&ctx),
                Mode::Plain,
                plain_transport,
            )),
            gossip::spawn(Arc::clone(&ctx), Mode::Plain, Duration::ZERO),
            gossip::spawn(Arc::clone(&ctx), Mode::Secure, connection_interval * 2),
        ];
        if let (Some(listener), Some(transport)) = (secure_listener, secure_transport) {
            tasks.push(tokio::spawn(accept_loop(
                listener,
                Arc::clone(&ctx),
                Mode::Secure,
                transport,
            )));
        }

        Ok(RunningServer {
            ctx,
            plain_addr,
            secure_addr,
            tasks,
        })
    }
}

async fn bind(host: &str, port: u16) -> ServerResult<TcpListener> {
    let addr = format!("{host}:{port}");
    TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Handle to a started server.
pub struct RunningServer {
    ctx: Arc<ServerContext>,
    plain_addr: SocketAddr,
    secure_addr: Option<SocketAddr>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningServer {
    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    /// Bound address of the plain listener.
    pub fn plain_addr(&self) -> SocketAddr {
        self.plain_addr
    }

    /// Bound address of the secured listener, if it is running.
    pub fn secure_addr(&self) -> Option<SocketAddr> {
        self.secure_addr
    }

    /// Stop accepting connections and stop gossiping.
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        info!("Server stopped");
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
