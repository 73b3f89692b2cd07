//! The accept loop: takes sockets off the listener, turns them into connections and hands them to
//! the registry, one at a time, until cancelled.

use crate::cleanup::release_all;
use crate::error::ServerError;
use crate::registry::ConnectionRegistry;
use micro_mllp::connection::{Connection, ConnectionFactory};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How the accept loop reacts to a failing `accept`.
///
/// Transient failures are retried after an exponentially growing pause, at most `max_attempts`
/// times in a row; any successful accept resets the count. Once the budget is spent, or on a
/// failure that retrying can't fix, the loop stops with [`ServerError::Accept`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptRetry {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl AcceptRetry {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

    /// Stop on the first accept failure.
    pub fn none() -> Self {
        Self { max_attempts: 0, ..Self::default() }
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// The pause before retry number `attempt`, counted from 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

impl Default for AcceptRetry {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(1),
        }
    }
}

/// Whether retrying `accept` after `e` can succeed, e.g. a peer that reset before being accepted
/// or a process that ran out of file descriptors.
fn is_transient(e: &io::Error) -> bool {
    !matches!(
        e.kind(),
        io::ErrorKind::InvalidInput
            | io::ErrorKind::NotConnected
            | io::ErrorKind::PermissionDenied
            | io::ErrorKind::Unsupported
            | io::ErrorKind::AddrNotAvailable
    )
}

pub(crate) struct AcceptLoop<F: ConnectionFactory> {
    pub(crate) listener: TcpListener,
    pub(crate) factory: Arc<F>,
    pub(crate) registry: Arc<ConnectionRegistry<F::Connection>>,
    pub(crate) token: CancellationToken,
    pub(crate) retry: AcceptRetry,
}

impl<F: ConnectionFactory> AcceptLoop<F> {
    /// Runs until the token is cancelled, or until accepting fails for good.
    ///
    /// The listener is closed when this returns.
    pub(crate) async fn run(self) -> Result<(), ServerError> {
        let mut failures = 0u32;

        loop {
            let accepted = select! {
                biased;
                () = self.token.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(accepted) => {
                    failures = 0;
                    accepted
                }

                Err(e) if is_transient(&e) && failures < self.retry.max_attempts => {
                    failures += 1;
                    let backoff = self.retry.backoff(failures);
                    warn!(cause = %e, attempt = failures, backoff = ?backoff, "failed to accept, retrying");
                    select! {
                        biased;
                        () = self.token.cancelled() => break,
                        () = tokio::time::sleep(backoff) => continue,
                    }
                }

                Err(source) => {
                    error!(cause = %source, attempts = failures + 1, "failed to accept, stop accepting");
                    return Err(ServerError::Accept { attempts: failures + 1, source });
                }
            };

            debug!(peer = %peer, "accepted tcp connection");
            let connection = select! {
                biased;
                () = self.token.cancelled() => {
                    debug!(peer = %peer, "server shutting down, drop connection under construction");
                    break;
                }
                connection = self.factory.connect(stream, peer) => connection,
            };

            match connection {
                Ok(connection) => {
                    if let Err(connection) = self.registry.insert(connection) {
                        debug!(peer = %peer, "server shutting down, release connection just accepted");
                        release_all(vec![connection]);
                        break;
                    }
                    info!(peer = %peer, "connection established");
                }
                Err(e) => warn!(peer = %peer, cause = %e, "failed to set up connection"),
            }
        }

        debug!("accept loop stopped");
        Ok(())
    }
}
