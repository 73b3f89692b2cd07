use crate::connection::{ConnectError, ConnectionConfig, ConnectionFactory, MllpConnection};
use crate::tls::{CertificateValidator, ServerCertificate, TlsError};
use crate::transport::Transport;
use async_trait::async_trait;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tracing::debug;

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds [`MllpConnection`]s, upgrading every socket to TLS when a certificate is configured.
#[derive(Clone)]
pub struct MllpConnectionFactory {
    config: Arc<ConnectionConfig>,
    tls_acceptor: Option<TlsAcceptor>,
    handshake_timeout: Duration,
}

impl MllpConnectionFactory {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config: Arc::new(config), tls_acceptor: None, handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT }
    }

    /// A factory accepting TLS only; `validator` is consulted for client certificates.
    pub fn with_tls(
        config: ConnectionConfig,
        certificate: &ServerCertificate,
        validator: Option<CertificateValidator>,
    ) -> Result<Self, TlsError> {
        let tls_acceptor = certificate.acceptor(validator)?;
        Ok(Self { tls_acceptor: Some(tls_acceptor), ..Self::new(config) })
    }

    /// Zero means [`DEFAULT_HANDSHAKE_TIMEOUT`].
    pub fn handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = if handshake_timeout.is_zero() { DEFAULT_HANDSHAKE_TIMEOUT } else { handshake_timeout };
        self
    }

    pub fn is_tls(&self) -> bool {
        self.tls_acceptor.is_some()
    }

    async fn handshake(&self, acceptor: &TlsAcceptor, stream: TcpStream, peer: SocketAddr) -> Result<Transport, ConnectError> {
        let timeout = self.handshake_timeout;
        match tokio::time::timeout(timeout, acceptor.accept(stream)).await {
            Ok(Ok(stream)) => {
                debug!(peer = %peer, "tls handshake completed");
                Ok(Transport::tls(stream))
            }
            Ok(Err(source)) => Err(ConnectError::Handshake { peer, source }),
            Err(_elapsed) => Err(ConnectError::HandshakeTimeout { peer, timeout }),
        }
    }
}

#[async_trait]
impl ConnectionFactory for MllpConnectionFactory {
    type Connection = MllpConnection;

    async fn connect(&self, stream: TcpStream, peer: SocketAddr) -> Result<MllpConnection, ConnectError> {
        stream.set_nodelay(true)?;

        let transport = match &self.tls_acceptor {
            Some(acceptor) => self.handshake(acceptor, stream, peer).await?,
            None => Transport::plain(stream),
        };

        Ok(MllpConnection::spawn(transport, peer, Arc::clone(&self.config)))
    }
}

impl fmt::Debug for MllpConnectionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MllpConnectionFactory")
            .field("config", &self.config)
            .field("tls", &self.is_tls())
            .field("handshake_timeout", &self.handshake_timeout)
            .finish()
    }
}
