//! The set of connections a server currently tracks.
//!
//! Connections are inserted by the accept loop and removed either by the cleanup sweep (once
//! they report themselves disconnected) or all at once when the server shuts down. Removal
//! hands the connection back to the caller by value, so a connection leaves the registry, and
//! is released, exactly once. The lock is only held for the collection update; releasing
//! happens after it has been dropped.

use micro_mllp::connection::Connection;
use std::mem;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
pub struct ConnectionRegistry<C> {
    state: Mutex<RegistryState<C>>,
}

#[derive(Debug)]
struct RegistryState<C> {
    connections: Vec<C>,
    closed: bool,
}

impl<C: Connection> ConnectionRegistry<C> {
    pub fn new() -> Self {
        Self { state: Mutex::new(RegistryState { connections: Vec::new(), closed: false }) }
    }

    /// Tracks `connection`, in accept order.
    ///
    /// Once the registry is closed the connection is handed back in `Err`, and the caller is
    /// responsible for releasing it.
    pub fn insert(&self, connection: C) -> Result<(), C> {
        let mut state = self.lock();
        if state.closed {
            return Err(connection);
        }
        state.connections.push(connection);
        Ok(())
    }

    /// Removes and returns every connection that is no longer connected.
    pub fn sweep_disconnected(&self) -> Vec<C> {
        let mut state = self.lock();
        let (disconnected, connected) =
            mem::take(&mut state.connections).into_iter().partition(|connection| !connection.is_connected());
        state.connections = connected;
        disconnected
    }

    /// Refuses further inserts and removes every connection, connected or not.
    pub fn close(&self) -> Vec<C> {
        let mut state = self.lock();
        state.closed = true;
        mem::take(&mut state.connections)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().connections.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState<C>> {
        // every critical section is a single collection update, a poisoned state is still consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Connection> Default for ConnectionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use micro_mllp::connection::ReleaseError;
    use std::collections::HashSet;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    /// A connection whose liveness is driven by the test and whose releases are counted.
    #[derive(Debug, Clone)]
    pub(crate) struct Probe {
        pub(crate) id: u16,
        pub(crate) connected: Arc<AtomicBool>,
        pub(crate) releases: Arc<AtomicUsize>,
        pub(crate) fail_release: bool,
    }

    impl Probe {
        pub(crate) fn new(id: u16) -> Self {
            Self {
                id,
                connected: Arc::new(AtomicBool::new(true)),
                releases: Arc::new(AtomicUsize::new(0)),
                fail_release: false,
            }
        }

        pub(crate) fn disconnect(&self) {
            self.connected.store(false, Ordering::SeqCst);
        }

        pub(crate) fn release_count(&self) -> usize {
            self.releases.load(Ordering::SeqCst)
        }
    }

    impl Connection for Probe {
        fn peer_addr(&self) -> SocketAddr {
            SocketAddr::from(([127, 0, 0, 1], self.id))
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn release(self) -> Result<(), ReleaseError> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            if self.fail_release {
                return Err(ReleaseError::new(self.peer_addr(), "socket already gone"));
            }
            Ok(())
        }
    }

    fn ids(connections: &[Probe]) -> Vec<u16> {
        connections.iter().map(|probe| probe.id).collect()
    }

    #[test]
    fn sweep_removes_only_disconnected() {
        let registry = ConnectionRegistry::new();
        let probes: Vec<_> = (1..=4).map(Probe::new).collect();
        for probe in &probes {
            registry.insert(probe.clone()).unwrap();
        }

        probes[1].disconnect();
        probes[3].disconnect();

        assert_eq!(ids(&registry.sweep_disconnected()), vec![2, 4]);
        assert_eq!(registry.len(), 2);
        assert!(registry.sweep_disconnected().is_empty());

        assert_eq!(ids(&registry.close()), vec![1, 3]);
        assert!(registry.is_empty());
    }

    #[test]
    fn sweep_does_not_release() {
        let registry = ConnectionRegistry::new();
        let probe = Probe::new(1);
        registry.insert(probe.clone()).unwrap();
        probe.disconnect();

        let removed = registry.sweep_disconnected();
        assert_eq!(removed.len(), 1);
        assert_eq!(probe.release_count(), 0);
    }

    #[test]
    fn closed_registry_refuses_inserts() {
        let registry = ConnectionRegistry::new();
        registry.insert(Probe::new(1)).unwrap();

        assert_eq!(registry.close().len(), 1);
        assert!(registry.is_closed());

        let rejected = registry.insert(Probe::new(2)).unwrap_err();
        assert_eq!(rejected.id, 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_insert_and_sweep_lose_nothing() {
        const WRITERS: u16 = 4;
        const PER_WRITER: u16 = 250;

        let registry = ConnectionRegistry::new();
        let swept = Mutex::new(Vec::new());

        thread::scope(|scope| {
            for writer in 0..WRITERS {
                let registry = &registry;
                scope.spawn(move || {
                    for n in 0..PER_WRITER {
                        let probe = Probe::new(writer * PER_WRITER + n);
                        // every other connection is already gone when it is inserted
                        if n % 2 == 0 {
                            probe.disconnect();
                        }
                        registry.insert(probe).unwrap();
                    }
                });
            }

            scope.spawn(|| {
                for _ in 0..200 {
                    let removed = registry.sweep_disconnected();
                    swept.lock().unwrap().extend(ids(&removed));
                    thread::yield_now();
                }
            });
        });

        let mut swept = swept.into_inner().unwrap();
        swept.extend(ids(&registry.sweep_disconnected()));
        let remaining = ids(&registry.close());

        let total = usize::from(WRITERS * PER_WRITER);
        assert_eq!(swept.len(), total / 2);
        assert_eq!(remaining.len(), total / 2);

        let unique: HashSet<_> = swept.iter().chain(remaining.iter()).collect();
        assert_eq!(unique.len(), total);
        assert!(swept.iter().all(|id| id % 2 == 0));
    }
}
