//! Transports: plain TCP and mutually authenticated TLS.
//!
//! A [`Transport`] turns accepted TCP sockets into byte streams and opens
//! outbound streams to peers. The server runs one listener per transport
//! and never needs to know which one it is talking through beyond the
//! secured/plain mode it was started in.

use crate::error::{WireError, WireResult};
use async_trait::async_trait;
use sharemesh_types::{PeerAddress, TlsConfig};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::debug;

/// A bidirectional byte stream.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// Type-erased stream produced by a transport.
pub type BoxedStream = Box<dyn AsyncStream>;

/// Produces byte streams for inbound and outbound connections.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Wrap an accepted socket.
    async fn accept(&self, stream: TcpStream) -> WireResult<BoxedStream>;

    /// Open a stream to a peer.
    async fn connect(&self, peer: &PeerAddress) -> WireResult<BoxedStream>;
}

/// Unencrypted TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTransport;

#[async_trait]
impl Transport for PlainTransport {
    async fn accept(&self, stream: TcpStream) -> WireResult<BoxedStream> {
        Ok(Box::new(stream))
    }

    async fn connect(&self, peer: &PeerAddress) -> WireResult<BoxedStream> {
        let stream = TcpStream::connect((peer.hostname.as_str(), peer.port)).await?;
        Ok(Box::new(stream))
    }
}

/// TLS with client certificates. Both sides present the same identity and
/// trust the same CA.
#[derive(Clone)]
pub struct TlsTransport {
    acceptor: TlsAcceptor,
    connector: TlsConnector,
}

impl TlsTransport {
    /// Build from PEM files.
    pub fn from_config(config: &TlsConfig) -> WireResult<Self> {
        let certs = load_certs(&config.cert_path)?;
        let key = load_key(&config.key_path)?;

        let mut roots = RootCertStore::empty();
        for ca in load_certs(&config.ca_path)? {
            roots
                .add(ca)
                .map_err(|e| WireError::Tls(format!("bad CA certificate: {e}")))?;
        }
        let roots = Arc::new(roots);

        let verifier = WebPkiClientVerifier::builder(Arc::clone(&roots))
            .build()
            .map_err(|e| WireError::Tls(e.to_string()))?;
        let server_config = ServerConfig::builder()
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs.clone(), key.clone_key())
            .map_err(|e| WireError::Tls(e.to_string()))?;
        let client_config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_client_auth_cert(certs, key)
            .map_err(|e| WireError::Tls(e.to_string()))?;

        debug!(cert = %config.cert_path.display(), "TLS transport ready");
        Ok(Self {
            acceptor: TlsAcceptor::from(Arc::new(server_config)),
            connector: TlsConnector::from(Arc::new(client_config)),
        })
    }
}

#[async_trait]
impl Transport for TlsTransport {
    async fn accept(&self, stream: TcpStream) -> WireResult<BoxedStream> {
        let tls = self.acceptor.accept(stream).await?;
        Ok(Box::new(tls))
    }

    async fn connect(&self, peer: &PeerAddress) -> WireResult<BoxedStream> {
        let name = ServerName::try_from(peer.hostname.clone())
            .map_err(|e| WireError::Tls(format!("invalid server name {}: {e}", peer.hostname)))?;
        let stream = TcpStream::connect((peer.hostname.as_str(), peer.port)).await?;
        let tls = self.connector.connect(name, stream).await?;
        Ok(Box::new(tls))
    }
}

fn load_certs(path: &Path) -> WireResult<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(File::open(path)?);
    let certs = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(WireError::Tls(format!(
            "no certificates in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> WireResult<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::private_key(&mut reader)?
        .ok_or_else(|| WireError::Tls(format!("no private key in {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{read_frame, write_frame};
    use std::path::PathBuf;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_plain_transport_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut stream = PlainTransport.accept(socket).await.unwrap();
            let text = read_frame(&mut stream).await.unwrap();
            write_frame(&mut stream, &text.to_uppercase()).await.unwrap();
        });

        let mut stream = PlainTransport
            .connect(&PeerAddress::new("127.0.0.1", port))
            .await
            .unwrap();
        write_frame(&mut stream, "ping").await.unwrap();
        assert_eq!(read_frame(&mut stream).await.unwrap(), "PING");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_plain_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let result = PlainTransport
            .connect(&PeerAddress::new("127.0.0.1", port))
            .await;
        assert!(matches!(result, Err(WireError::Io(_))));
    }

    #[test]
    fn test_tls_missing_files() {
        let config = TlsConfig {
            cert_path: PathBuf::from("/nonexistent/cert.pem"),
            key_path: PathBuf::from("/nonexistent/key.pem"),
            ca_path: PathBuf::from("/nonexistent/ca.pem"),
        };
        assert!(matches!(
            TlsTransport::from_config(&config),
            Err(WireError::Io(_))
        ));
    }
}
