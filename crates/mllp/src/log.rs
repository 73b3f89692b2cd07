//! Message log sink
//!
//! Connections report every message they receive and every reply they send to a
//! [`MessageLog`]. Persisting those messages is the sink's business; this crate only ships a
//! sink that writes to `tracing` and one that discards.

use std::fmt::Debug;
use std::net::SocketAddr;
use tracing::info;

pub trait MessageLog: Send + Sync + Debug {
    fn inbound(&self, peer: SocketAddr, text: &str);

    fn outbound(&self, peer: SocketAddr, text: &str);
}

/// Logs messages at `info` level, with segment separators escaped.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMessageLog;

impl MessageLog for TracingMessageLog {
    fn inbound(&self, peer: SocketAddr, text: &str) {
        info!(peer = %peer, direction = "inbound", message = %text.escape_debug(), "message received");
    }

    fn outbound(&self, peer: SocketAddr, text: &str) {
        info!(peer = %peer, direction = "outbound", message = %text.escape_debug(), "message sent");
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMessageLog;

impl MessageLog for NoopMessageLog {
    fn inbound(&self, _peer: SocketAddr, _text: &str) {}

    fn outbound(&self, _peer: SocketAddr, _text: &str) {}
}
