//! MLLP connection handling
//!
//! A server only sees connections through two contracts:
//!
//! - [`ConnectionFactory`]: turns an accepted socket into a running connection, possibly after
//!   a TLS handshake
//! - [`Connection`]: reports whether the peer is still there and can be released
//!
//! [`MllpConnectionFactory`] and [`MllpConnection`] implement them for MLLP: each connection
//! owns a task that reads frames, reports them to the [`MessageLog`](crate::log::MessageLog),
//! dispatches them to the [`Middleware`](crate::handler::Middleware) and writes the replies back.

mod config;
mod factory;
mod mllp_connection;

pub use config::ConnectionConfig;
pub use factory::DEFAULT_HANDSHAKE_TIMEOUT;
pub use factory::MllpConnectionFactory;
pub use mllp_connection::MllpConnection;

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;

/// A live connection tracked by a server.
///
/// `release` consumes the connection, so it runs at most once per connection.
pub trait Connection: Send + 'static {
    fn peer_addr(&self) -> SocketAddr;

    fn is_connected(&self) -> bool;

    /// Frees the connection's resources, whether or not the peer is still connected.
    fn release(self) -> Result<(), ReleaseError>;
}

#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: Connection;

    async fn connect(&self, stream: TcpStream, peer: SocketAddr) -> Result<Self::Connection, ConnectError>;
}

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("tls handshake with {peer} failed: {source}")]
    Handshake { peer: SocketAddr, source: io::Error },

    #[error("tls handshake with {peer} timed out after {timeout:?}")]
    HandshakeTimeout { peer: SocketAddr, timeout: Duration },

    #[error("socket setup failed: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

#[derive(Error, Debug)]
#[error("failed to release connection with {peer}: {reason}")]
pub struct ReleaseError {
    peer: SocketAddr,
    reason: String,
}

impl ReleaseError {
    pub fn new<S: ToString>(peer: SocketAddr, reason: S) -> Self {
        Self { peer, reason: reason.to_string() }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}
