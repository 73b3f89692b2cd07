//! Periodic removal of connections whose peer went away.

use crate::registry::ConnectionRegistry;
use micro_mllp::connection::Connection;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::select;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outcome of a release pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Released {
    pub succeeded: usize,
    pub failed: usize,
}

/// Releases every connection in turn; a failing release is logged and the rest still run.
pub fn release_all<C: Connection>(connections: Vec<C>) -> Released {
    let mut released = Released::default();
    for connection in connections {
        let peer = connection.peer_addr();
        match connection.release() {
            Ok(()) => released.succeeded += 1,
            Err(e) => {
                warn!(peer = %peer, cause = %e, "failed to release connection");
                released.failed += 1;
            }
        }
    }
    released
}

/// Removes the disconnected connections from `registry` and releases them.
pub fn sweep<C: Connection>(registry: &ConnectionRegistry<C>) -> Released {
    let released = release_all(registry.sweep_disconnected());
    if released.succeeded + released.failed > 0 {
        debug!(succeeded = released.succeeded, failed = released.failed, "swept disconnected connections");
    }
    released
}

/// Runs [`sweep`] every `period` until stopped, the first time one `period` after spawning.
#[derive(Debug)]
pub struct CleanupScheduler {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CleanupScheduler {
    pub fn spawn<C: Connection>(registry: Arc<ConnectionRegistry<C>>, period: Duration, handle: &Handle) -> Self {
        let token = CancellationToken::new();
        let task = handle.spawn(Self::run(registry, period, token.clone()));
        Self { token, task: Some(task) }
    }

    async fn run<C: Connection>(registry: Arc<ConnectionRegistry<C>>, period: Duration, token: CancellationToken) {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(period = ?period, "cleanup scheduler started");
        loop {
            select! {
                biased;
                () = token.cancelled() => break,
                _ = interval.tick() => {
                    sweep(&registry);
                }
            }
        }
        debug!("cleanup scheduler stopped");
    }

    /// Stops the timer and waits until a sweep in progress, if any, has finished.
    pub async fn stop(&mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
            && e.is_panic()
        {
            warn!(cause = %e, "cleanup task panicked");
        }
    }
}

impl Drop for CleanupScheduler {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
