//! The server facade.
//!
//! A [`Server`] binds its socket and starts the cleanup scheduler as soon as it is created,
//! begins accepting on [`Server::start`] and tears everything down on [`Server::shutdown`]:
//!
//! 1. the cancellation token is cancelled, the accept loop exits and the listener closes
//! 2. the cleanup scheduler stops
//! 3. the registry is closed and every connection still in it is released
//!
//! Dropping a server without shutting it down performs the same teardown without waiting for the
//! accept loop and the scheduler to finish.

use crate::accept::{AcceptLoop, AcceptRetry};
use crate::cleanup::{CleanupScheduler, Released, release_all};
use crate::error::{ServerBuildError, ServerError};
use crate::registry::ConnectionRegistry;
use crate::settings::{DEFAULT_BACKLOG, DEFAULT_CLEANUP_INTERVAL, ServerSettings};
use micro_mllp::codec::DEFAULT_MAX_FRAME_SIZE;
use micro_mllp::connection::{
    ConnectionConfig, ConnectionFactory, DEFAULT_HANDSHAKE_TIMEOUT, MllpConnectionFactory,
};
use micro_mllp::handler::Middleware;
use micro_mllp::log::MessageLog;
use micro_mllp::protocol::{Hl7Parser, TextEncoding};
use micro_mllp::tls::{CertificateValidator, ServerCertificate};
use std::fmt;
use std::mem;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpSocket;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Server wide settings that don't concern individual connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerOptions {
    /// Zero means [`DEFAULT_CLEANUP_INTERVAL`].
    pub cleanup_interval: Duration,
    pub backlog: u32,
    pub accept_retry: AcceptRetry,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self { cleanup_interval: DEFAULT_CLEANUP_INTERVAL, backlog: DEFAULT_BACKLOG, accept_retry: AcceptRetry::default() }
    }
}

enum Lifecycle {
    Bound(TcpSocket),
    Accepting(JoinHandle<Result<(), ServerError>>),
    Stopped,
}

pub struct Server<F: ConnectionFactory = MllpConnectionFactory> {
    local_addr: SocketAddr,
    factory: Arc<F>,
    registry: Arc<ConnectionRegistry<F::Connection>>,
    token: CancellationToken,
    cleanup: CleanupScheduler,
    lifecycle: Lifecycle,
    options: ServerOptions,
    handle: Handle,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }
}

impl<F: ConnectionFactory> Server<F> {
    /// Binds `address` and starts the cleanup scheduler; connections are not accepted before
    /// [`start`](Self::start).
    ///
    /// Must be called from within a tokio runtime, which then runs the server's tasks.
    pub fn new(address: SocketAddr, factory: F, options: ServerOptions) -> Result<Self, ServerError> {
        let handle = Handle::try_current()?;

        let options = ServerOptions {
            cleanup_interval: if options.cleanup_interval.is_zero() { DEFAULT_CLEANUP_INTERVAL } else { options.cleanup_interval },
            ..options
        };

        let socket = bind(address).map_err(|source| ServerError::Bind { address, source })?;
        let local_addr = socket.local_addr().map_err(|source| ServerError::Bind { address, source })?;

        let registry = Arc::new(ConnectionRegistry::new());
        let cleanup = CleanupScheduler::spawn(Arc::clone(&registry), options.cleanup_interval, &handle);

        info!(address = %local_addr, cleanup_interval = ?options.cleanup_interval, "server bound");
        Ok(Self {
            local_addr,
            factory: Arc::new(factory),
            registry,
            token: CancellationToken::new(),
            cleanup,
            lifecycle: Lifecycle::Bound(socket),
            options,
            handle,
        })
    }

    /// Starts listening and spawns the accept loop.
    pub fn start(&mut self) -> Result<(), ServerError> {
        let socket = match mem::replace(&mut self.lifecycle, Lifecycle::Stopped) {
            Lifecycle::Bound(socket) => socket,
            accepting @ Lifecycle::Accepting(_) => {
                self.lifecycle = accepting;
                return Err(ServerError::AlreadyStarted);
            }
            Lifecycle::Stopped => return Err(ServerError::Stopped),
        };

        let _runtime = self.handle.enter();
        let listener = socket
            .listen(self.options.backlog)
            .map_err(|source| ServerError::Listen { address: self.local_addr, source })?;

        let accept_loop = AcceptLoop {
            listener,
            factory: Arc::clone(&self.factory),
            registry: Arc::clone(&self.registry),
            token: self.token.clone(),
            retry: self.options.accept_retry,
        };
        self.lifecycle = Lifecycle::Accepting(self.handle.spawn(accept_loop.run()));

        info!(address = %self.local_addr, backlog = self.options.backlog, "server started");
        Ok(())
    }

    /// Stops accepting, stops the cleanup scheduler and releases every tracked connection.
    ///
    /// Calling it again, or on a server that was never started, is harmless. The returned error,
    /// if any, is the one that made the accept loop give up earlier on; release failures are only
    /// logged.
    pub async fn shutdown(&mut self) -> Result<(), ServerError> {
        self.token.cancel();

        let accept_result = match mem::replace(&mut self.lifecycle, Lifecycle::Stopped) {
            Lifecycle::Accepting(task) => match task.await {
                Ok(result) => result,
                Err(e) => {
                    error!(cause = %e, "accept task failed");
                    Ok(())
                }
            },
            Lifecycle::Bound(_) | Lifecycle::Stopped => Ok(()),
        };

        self.cleanup.stop().await;

        let released = self.release_remaining();
        info!(address = %self.local_addr, succeeded = released.succeeded, failed = released.failed, "server stopped");

        accept_result
    }

    fn release_remaining(&self) -> Released {
        let released = release_all(self.registry.close());
        debug_assert!(self.registry.is_empty());
        released
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The number of connections currently tracked, including disconnected ones not swept yet.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_started(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Accepting(_))
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }
}

impl<F: ConnectionFactory> Drop for Server<F> {
    fn drop(&mut self) {
        if matches!(self.lifecycle, Lifecycle::Stopped) && self.registry.is_closed() {
            return;
        }

        debug!(address = %self.local_addr, "server dropped without shutdown");
        self.token.cancel();
        self.lifecycle = Lifecycle::Stopped;
        self.release_remaining();
    }
}

impl<F: ConnectionFactory + fmt::Debug> fmt::Debug for Server<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .field("factory", &self.factory)
            .field("connections", &self.registry.len())
            .field("started", &self.is_started())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn bind(address: SocketAddr) -> std::io::Result<TcpSocket> {
    let socket = if address.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
    #[cfg(unix)]
    socket.set_reuseaddr(true)?;
    socket.bind(address)?;
    Ok(socket)
}

/// Assembles a [`Server`] around an [`MllpConnectionFactory`].
///
/// The address, the message log and the middleware are required.
pub struct ServerBuilder {
    address: Option<SocketAddr>,
    log: Option<Arc<dyn MessageLog>>,
    middleware: Option<Arc<dyn Middleware>>,
    parser: Option<Arc<dyn Hl7Parser>>,
    encoding: TextEncoding,
    max_frame_size: usize,
    certificate: Option<ServerCertificate>,
    certificate_validator: Option<CertificateValidator>,
    handshake_timeout: Duration,
    options: ServerOptions,
}

impl ServerBuilder {
    fn new() -> Self {
        Self {
            address: None,
            log: None,
            middleware: None,
            parser: None,
            encoding: TextEncoding::default(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            certificate: None,
            certificate_validator: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            options: ServerOptions::default(),
        }
    }

    pub fn address(mut self, address: impl Into<SocketAddr>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn log_sink(mut self, log: impl MessageLog + 'static) -> Self {
        self.log = Some(Arc::new(log));
        self
    }

    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware = Some(Arc::new(middleware));
        self
    }

    pub fn parser(mut self, parser: impl Hl7Parser + 'static) -> Self {
        self.parser = Some(Arc::new(parser));
        self
    }

    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Enables TLS for every connection.
    pub fn certificate(mut self, certificate: ServerCertificate) -> Self {
        self.certificate = Some(certificate);
        self
    }

    /// Only consulted when a certificate is set.
    pub fn certificate_validator(mut self, validator: CertificateValidator) -> Self {
        self.certificate_validator = Some(validator);
        self
    }

    pub fn handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = handshake_timeout;
        self
    }

    pub fn cleanup_interval(mut self, cleanup_interval: Duration) -> Self {
        self.options.cleanup_interval = cleanup_interval;
        self
    }

    pub fn backlog(mut self, backlog: u32) -> Self {
        self.options.backlog = backlog;
        self
    }

    pub fn accept_retry(mut self, accept_retry: AcceptRetry) -> Self {
        self.options.accept_retry = accept_retry;
        self
    }

    /// Takes everything but TLS from the `[server]` section of a settings file.
    pub fn apply_settings(self, settings: &ServerSettings) -> Self {
        let accept_retry = self.options.accept_retry.max_attempts(settings.accept_retries);
        self.address(settings.address)
            .cleanup_interval(settings.cleanup_interval())
            .backlog(settings.backlog)
            .encoding(settings.encoding)
            .max_frame_size(settings.max_frame_size)
            .handshake_timeout(settings.handshake_timeout())
            .accept_retry(accept_retry)
    }

    pub fn build(self) -> Result<Server, ServerBuildError> {
        let address = self.address.ok_or(ServerBuildError::MissingAddress)?;
        let log = self.log.ok_or(ServerBuildError::MissingLogSink)?;
        let middleware = self.middleware.ok_or(ServerBuildError::MissingMiddleware)?;

        let mut config =
            ConnectionConfig::new(log, middleware).encoding(self.encoding).max_frame_size(self.max_frame_size);
        if let Some(parser) = self.parser {
            config = config.parser(parser);
        }

        let factory = match &self.certificate {
            Some(certificate) => MllpConnectionFactory::with_tls(config, certificate, self.certificate_validator)?,
            None => {
                if self.certificate_validator.is_some() {
                    warn!("certificate validator ignored, no server certificate configured");
                }
                MllpConnectionFactory::new(config)
            }
        };

        Ok(Server::new(address, factory.handshake_timeout(self.handshake_timeout), self.options)?)
    }
}

impl fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("address", &self.address)
            .field("encoding", &self.encoding)
            .field("max_frame_size", &self.max_frame_size)
            .field("tls", &self.certificate.is_some())
            .field("handshake_timeout", &self.handshake_timeout)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use micro_mllp::handler::AckMiddleware;
    use micro_mllp::log::NoopMessageLog;
    use tokio::net::TcpStream;

    fn localhost() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    #[test]
    fn new_outside_runtime_fails() {
        let result = Server::builder().address(localhost()).log_sink(NoopMessageLog).middleware(AckMiddleware::new()).build();
        assert!(matches!(result, Err(ServerBuildError::Server(ServerError::Runtime(_)))));
    }

    #[tokio::test]
    async fn builder_requires_address_log_and_middleware() {
        let missing_address = Server::builder().log_sink(NoopMessageLog).middleware(AckMiddleware::new()).build();
        assert!(matches!(missing_address, Err(ServerBuildError::MissingAddress)));

        let missing_log = Server::builder().address(localhost()).middleware(AckMiddleware::new()).build();
        assert!(matches!(missing_log, Err(ServerBuildError::MissingLogSink)));

        let missing_middleware = Server::builder().address(localhost()).log_sink(NoopMessageLog).build();
        assert!(matches!(missing_middleware, Err(ServerBuildError::MissingMiddleware)));
    }

    #[tokio::test]
    async fn zero_cleanup_interval_falls_back_to_default() {
        let server = Server::builder()
            .address(localhost())
            .log_sink(NoopMessageLog)
            .middleware(AckMiddleware::new())
            .cleanup_interval(Duration::ZERO)
            .build()
            .unwrap();

        assert_eq!(server.options.cleanup_interval, DEFAULT_CLEANUP_INTERVAL);
        assert_ne!(server.local_addr().port(), 0);
        assert!(!server.factory().is_tls());
    }

    #[tokio::test]
    async fn apply_settings() {
        let settings = ServerSettings {
            address: localhost(),
            cleanup_interval_ms: 200,
            backlog: 16,
            encoding: TextEncoding::Utf8,
            accept_retries: 3,
            ..ServerSettings::default()
        };

        let server = Server::builder()
            .log_sink(NoopMessageLog)
            .middleware(AckMiddleware::new())
            .apply_settings(&settings)
            .build()
            .unwrap();

        assert_eq!(server.options.cleanup_interval, Duration::from_millis(200));
        assert_eq!(server.options.backlog, 16);
        assert_eq!(server.options.accept_retry.max_attempts, 3);
    }

    #[tokio::test]
    async fn start_twice_and_after_shutdown() {
        let mut server = Server::builder()
            .address(localhost())
            .log_sink(NoopMessageLog)
            .middleware(AckMiddleware::new())
            .build()
            .unwrap();

        server.start().unwrap();
        assert!(server.is_started());
        assert!(matches!(server.start(), Err(ServerError::AlreadyStarted)));
        assert!(server.is_started());

        server.shutdown().await.unwrap();
        assert!(!server.is_started());
        assert!(matches!(server.start(), Err(ServerError::Stopped)));
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn not_accepting_before_start() {
        let mut server = Server::builder()
            .address(localhost())
            .log_sink(NoopMessageLog)
            .middleware(AckMiddleware::new())
            .build()
            .unwrap();

        assert!(TcpStream::connect(server.local_addr()).await.is_err());

        server.shutdown().await.unwrap();
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let listener = std::net::TcpListener::bind(localhost()).unwrap();
        let address = listener.local_addr().unwrap();

        let result = Server::builder().address(address).log_sink(NoopMessageLog).middleware(AckMiddleware::new()).build();
        // with SO_REUSEADDR the bind itself may succeed; the conflict then shows on listen
        match result {
            Err(ServerBuildError::Server(ServerError::Bind { address: reported, .. })) => assert_eq!(reported, address),
            Ok(mut server) => assert!(matches!(server.start(), Err(ServerError::Listen { .. }))),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
