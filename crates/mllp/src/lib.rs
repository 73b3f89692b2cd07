//! An asynchronous MLLP connection layer
//!
//! This crate provides the per-connection half of an HL7 messaging server speaking the
//! Minimal Lower Layer Protocol over TCP, optionally upgraded to TLS. It is built on top of
//! tokio and is meant to be driven by a server that accepts sockets and tracks connection
//! lifetimes (see the `micro-mllp-server` crate).
//!
//! # Features
//!
//! - MLLP framing (`<VT> payload <FS><CR>`) as a `tokio_util` codec
//! - Plain TCP or TLS transport, decided once per connection
//! - Optional client certificate validation callback
//! - Pluggable message middleware, message log sink and HL7 parser
//! - Configurable text encoding, ASCII by default
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use micro_mllp::connection::{Connection, ConnectionConfig, ConnectionFactory, MllpConnectionFactory};
//! use micro_mllp::handler::AckMiddleware;
//! use micro_mllp::log::TracingMessageLog;
//! use micro_mllp::protocol::SegmentParser;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConnectionConfig::new(Arc::new(TracingMessageLog), Arc::new(AckMiddleware::new()))
//!         .parser(Arc::new(SegmentParser));
//!     let factory = MllpConnectionFactory::new(config);
//!
//!     let listener = TcpListener::bind("127.0.0.1:2575").await?;
//!     let (stream, peer) = listener.accept().await?;
//!     let connection = factory.connect(stream, peer).await?;
//!     assert!(connection.is_connected());
//!     connection.release()?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`codec`]: MLLP frame decoding and encoding
//! - [`protocol`]: requests, text encodings, HL7 parsing and error types
//! - [`handler`]: the [`handler::Middleware`] contract and the built-in acknowledgement middleware
//! - [`log`]: the message log sink contract
//! - [`tls`]: certificate loading and the TLS acceptor
//! - [`transport`]: the plain/TLS stream abstraction
//! - [`connection`]: the connection contract seen by servers and its MLLP implementation

pub mod codec;
pub mod connection;
pub mod handler;
pub mod log;
pub mod protocol;
pub mod tls;
pub mod transport;

mod utils;
pub(crate) use utils::ensure;
