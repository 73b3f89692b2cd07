use crate::codec::{FrameDecoder, FrameEncoder};
use crate::connection::{Connection, ConnectionConfig, ReleaseError};
use crate::protocol::{MllpError, MllpRequest};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::select;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// A running MLLP connection
///
/// The connection's processing task reads frames, dispatches them and writes replies until the
/// peer goes away, an error occurs or the connection is released. Dropping an `MllpConnection`
/// stops its task as well.
#[derive(Debug)]
pub struct MllpConnection {
    peer: SocketAddr,
    connected: Arc<AtomicBool>,
    _shutdown: DropGuard,
}

impl MllpConnection {
    /// Starts processing `stream` on the current tokio runtime.
    pub fn spawn<S>(stream: S, peer: SocketAddr, config: Arc<ConnectionConfig>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let token = CancellationToken::new();
        let connected = Arc::new(AtomicBool::new(true));

        let (reader, writer) = tokio::io::split(stream);
        let processor = FrameProcessor::new(reader, writer, peer, config);
        tokio::spawn(processor.run(token.clone(), Arc::clone(&connected)));

        Self { peer, connected, _shutdown: token.drop_guard() }
    }
}

impl Connection for MllpConnection {
    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn release(self) -> Result<(), ReleaseError> {
        debug!(peer = %self.peer, connected = self.is_connected(), "release connection");
        Ok(())
    }
}

/// Reads frames from `R` and writes replies to `W`
struct FrameProcessor<R, W> {
    framed_read: FramedRead<R, FrameDecoder>,
    framed_write: FramedWrite<W, FrameEncoder>,
    peer: SocketAddr,
    config: Arc<ConnectionConfig>,
}

impl<S> FrameProcessor<ReadHalf<S>, WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite,
{
    fn new(reader: ReadHalf<S>, writer: WriteHalf<S>, peer: SocketAddr, config: Arc<ConnectionConfig>) -> Self {
        let decoder = FrameDecoder::with_max_frame_size(config.max_frame_size);
        Self {
            framed_read: FramedRead::with_capacity(reader, decoder, 8 * 1024),
            framed_write: FramedWrite::new(writer, FrameEncoder),
            peer,
            config,
        }
    }

    async fn run(mut self, token: CancellationToken, connected: Arc<AtomicBool>) {
        let result = self.process(&token).await;
        connected.store(false, Ordering::Release);

        match result {
            Ok(()) => info!(peer = %self.peer, "connection closed"),
            Err(e) => warn!(peer = %self.peer, cause = %e, "connection closed on error"),
        }

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.framed_write.get_mut().shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(peer = %self.peer, cause = %e, "shutdown stream failed"),
            Err(_elapsed) => debug!(peer = %self.peer, "shutdown stream timed out"),
        }
    }

    async fn process(&mut self, token: &CancellationToken) -> Result<(), MllpError> {
        loop {
            let frame = select! {
                biased;
                () = token.cancelled() => {
                    debug!(peer = %self.peer, "connection released, stop reading");
                    return Ok(());
                }
                frame = self.framed_read.next() => frame,
            };

            match frame {
                Some(Ok(payload)) => self.dispatch(payload, token).await?,

                Some(Err(e)) => {
                    error!(peer = %self.peer, cause = %e, "can't receive next frame");
                    return Err(e.into());
                }

                None => {
                    info!(peer = %self.peer, "can't read more frames, peer closed the connection");
                    return Ok(());
                }
            }
        }
    }

    async fn dispatch(&mut self, payload: Bytes, token: &CancellationToken) -> Result<(), MllpError> {
        let config = Arc::clone(&self.config);
        let text = config.encoding.decode(&payload);
        config.log.inbound(self.peer, &text);

        let request = MllpRequest::new(self.peer, text, config.parser.clone());
        let reply = select! {
            biased;
            () = token.cancelled() => return Ok(()),
            reply = config.middleware.handle(request) => reply,
        };

        match reply {
            Ok(Some(reply)) => {
                config.log.outbound(self.peer, &reply);
                select! {
                    biased;
                    () = token.cancelled() => {
                        debug!(peer = %self.peer, "connection released while sending reply");
                        return Ok(());
                    }
                    sent = self.framed_write.send(config.encoding.encode(&reply)) => sent?,
                }
            }
            Ok(None) => debug!(peer = %self.peer, "middleware sent no reply"),
            Err(e) => error!(peer = %self.peer, cause = %e, "middleware failed to handle message"),
        }
        Ok(())
    }
}
