use async_trait::async_trait;
use micro_mllp::connection::{
    ConnectError, Connection, ConnectionConfig, ConnectionFactory, MllpConnection, MllpConnectionFactory, ReleaseError,
};
use micro_mllp::handler::{AckMiddleware, Middleware, middleware_fn};
use micro_mllp::log::NoopMessageLog;
use micro_mllp::protocol::SegmentParser;
use micro_mllp_server::{Server, ServerOptions};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Counts how often a connection gets released.
#[derive(Debug, Clone, Default)]
struct ReleaseCounter(Arc<AtomicUsize>);

impl ReleaseCounter {
    fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

struct Tracked {
    inner: MllpConnection,
    releases: ReleaseCounter,
}

impl Connection for Tracked {
    fn peer_addr(&self) -> SocketAddr {
        self.inner.peer_addr()
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn release(self) -> Result<(), ReleaseError> {
        self.releases.0.fetch_add(1, Ordering::SeqCst);
        self.inner.release()
    }
}

/// Wraps the MLLP factory, keeping a release counter for every connection it builds and failing
/// the first `failures` attempts.
struct TrackingFactory {
    inner: MllpConnectionFactory,
    counters: Mutex<Vec<ReleaseCounter>>,
    failures: AtomicUsize,
}

impl TrackingFactory {
    fn new() -> Self {
        Self::failing(0)
    }

    fn failing(failures: usize) -> Self {
        let config =
            ConnectionConfig::new(Arc::new(NoopMessageLog), Arc::new(AckMiddleware::new())).parser(Arc::new(SegmentParser));
        Self { inner: MllpConnectionFactory::new(config), counters: Mutex::default(), failures: AtomicUsize::new(failures) }
    }

    fn counters(&self) -> Vec<ReleaseCounter> {
        self.counters.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConnectionFactory for TrackingFactory {
    type Connection = Tracked;

    async fn connect(&self, stream: TcpStream, peer: SocketAddr) -> Result<Tracked, ConnectError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ConnectError::Io { source: std::io::Error::other("socket setup refused") });
        }

        let inner = self.inner.connect(stream, peer).await?;
        let releases = ReleaseCounter::default();
        self.counters.lock().unwrap().push(releases.clone());
        Ok(Tracked { inner, releases })
    }
}

fn localhost() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

fn options(cleanup_interval: Duration) -> ServerOptions {
    ServerOptions { cleanup_interval, ..ServerOptions::default() }
}

fn started(factory: TrackingFactory, cleanup_interval: Duration) -> Server<TrackingFactory> {
    let mut server = Server::new(localhost(), factory, options(cleanup_interval)).unwrap();
    server.start().unwrap();
    server
}

async fn wait_for(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn read_frame(client: &mut TcpStream) -> String {
    let mut reply = Vec::new();
    while !reply.ends_with(b"\x1c\x0d") {
        let mut buf = [0u8; 512];
        let read = client.read(&mut buf).await.unwrap();
        assert_ne!(read, 0, "connection closed before a full frame arrived");
        reply.extend_from_slice(&buf[..read]);
    }
    String::from_utf8(reply).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closed_client_is_swept() {
    let interval = Duration::from_millis(50);
    let mut server = started(TrackingFactory::new(), interval);

    let client = TcpStream::connect(server.local_addr()).await.unwrap();
    wait_for(|| server.connection_count() == 1).await;
    drop(client);

    tokio::time::sleep(interval * 2).await;
    wait_for(|| server.connection_count() == 0).await;

    let counters = server.factory().counters();
    assert_eq!(counters.len(), 1);
    assert_eq!(counters[0].get(), 1);

    server.shutdown().await.unwrap();
    assert_eq!(counters[0].get(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn open_client_survives_sweeps() {
    let mut server = started(TrackingFactory::new(), Duration::from_millis(100));

    let _client = TcpStream::connect(server.local_addr()).await.unwrap();
    wait_for(|| server.connection_count() == 1).await;

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(server.connection_count(), 1);
    assert_eq!(server.factory().counters()[0].get(), 0);

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_releases_every_connection_once() {
    let mut server = started(TrackingFactory::new(), Duration::from_secs(60));
    let address = server.local_addr();

    let mut clients = Vec::new();
    for _ in 0..3 {
        clients.push(TcpStream::connect(address).await.unwrap());
    }
    wait_for(|| server.connection_count() == 3).await;

    server.shutdown().await.unwrap();

    let counters = server.factory().counters();
    assert_eq!(counters.len(), 3);
    assert!(counters.iter().all(|counter| counter.get() == 1));
    assert_eq!(server.connection_count(), 0);
    assert!(TcpStream::connect(address).await.is_err());

    // released connections close their side of the socket
    for client in &mut clients {
        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(5), client.read(&mut buf)).await.unwrap().unwrap();
        assert_eq!(read, 0);
    }

    server.shutdown().await.unwrap();
    assert!(counters.iter().all(|counter| counter.get() == 1));
}

#[tokio::test]
async fn shutdown_without_start() {
    let mut server = Server::new(localhost(), TrackingFactory::new(), ServerOptions::default()).unwrap();

    server.shutdown().await.unwrap();

    assert_eq!(server.connection_count(), 0);
    assert!(server.factory().counters().is_empty());
    assert!(TcpStream::connect(server.local_addr()).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_setup_does_not_stop_accepting() {
    let mut server = started(TrackingFactory::failing(1), Duration::from_secs(60));

    let _rejected = TcpStream::connect(server.local_addr()).await.unwrap();
    let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
    wait_for(|| server.connection_count() == 1).await;

    client.write_all(b"\x0bMSH|^~\\&|LAB|HOSP|EHR|HOSP|20240101120000||ORU^R01|MSG00042|P|2.5\r\x1c\x0d").await.unwrap();
    let ack = read_frame(&mut client).await;
    assert!(ack.starts_with("\x0bMSH|^~\\&|EHR|HOSP|LAB|HOSP|"));
    assert!(ack.contains("|ACK^R01|MSG00042|P|2.5\r"));
    assert!(ack.ends_with("MSA|AA|MSG00042\r\x1c\x0d"));

    server.shutdown().await.unwrap();
    assert_eq!(server.factory().counters()[0].get(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropping_the_server_releases_connections() {
    let server = started(TrackingFactory::new(), Duration::from_secs(60));
    let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
    wait_for(|| server.connection_count() == 1).await;
    let counters = server.factory().counters();

    drop(server);

    assert_eq!(counters[0].get(), 1);
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(5), client.read(&mut buf)).await.unwrap().unwrap();
    assert_eq!(read, 0);
}

fn serving(middleware: impl Middleware + 'static) -> Server {
    let mut server =
        Server::builder().address(localhost()).log_sink(NoopMessageLog).middleware(middleware).build().unwrap();
    server.start().unwrap();
    server
}

/// Reads until the server closes the socket, returning the number of bytes received.
async fn drain(client: &mut TcpStream) -> usize {
    let mut received = 0;
    let mut buf = vec![0u8; 64 * 1024];
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match client.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(read) => received += read,
            }
        }
    })
    .await
    .expect("server should close the connection");
    received
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_while_middleware_is_pending() {
    let middleware =
        middleware_fn(|_request| std::future::pending::<Result<Option<String>, std::io::Error>>());
    let mut server = serving(middleware);

    let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
    client.write_all(b"\x0bMSH|^~\\&|LAB|HOSP|EHR|HOSP|20240101120000||ORU^R01|MSG1|P|2.5\r\x1c\x0d").await.unwrap();
    wait_for(|| server.connection_count() == 1).await;

    server.shutdown().await.unwrap();
    assert_eq!(drain(&mut client).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_while_reply_is_blocked() {
    const REPLY_SIZE: usize = 32 << 20;
    let middleware = middleware_fn(|_request| async { Ok::<_, std::io::Error>(Some("x".repeat(REPLY_SIZE))) });
    let mut server = serving(middleware);

    let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
    client.write_all(b"\x0bMSH|^~\\&|LAB|HOSP|EHR|HOSP|20240101120000||ORU^R01|MSG2|P|2.5\r\x1c\x0d").await.unwrap();

    // the reply is on its way, but far too large for the socket buffers
    let mut first = [0u8; 1];
    client.read_exact(&mut first).await.unwrap();
    assert_eq!(first[0], 0x0b);

    server.shutdown().await.unwrap();
    assert!(1 + drain(&mut client).await < REPLY_SIZE);
}
