//! An asynchronous MLLP server
//!
//! This crate accepts TCP (optionally TLS) connections, hands every accepted socket to a
//! [`ConnectionFactory`](micro_mllp::connection::ConnectionFactory) and keeps track of the
//! resulting connections until they are gone:
//!
//! - the accept loop runs in its own task and builds one connection at a time
//! - a connection registry holds every live connection in accept order
//! - a cleanup scheduler periodically releases the connections whose peer went away
//! - shutdown stops accepting and releases whatever is left, exactly once per connection
//!
//! # Example
//!
//! ```no_run
//! use micro_mllp::handler::AckMiddleware;
//! use micro_mllp::log::TracingMessageLog;
//! use micro_mllp::protocol::SegmentParser;
//! use micro_mllp_server::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::builder()
//!         .address(([127, 0, 0, 1], 2575))
//!         .log_sink(TracingMessageLog)
//!         .middleware(AckMiddleware::new())
//!         .parser(SegmentParser)
//!         .cleanup_interval(Duration::from_secs(5))
//!         .build()?;
//!
//!     server.start()?;
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod accept;
mod cleanup;
mod error;
mod registry;
mod server;
pub mod settings;

pub use accept::AcceptRetry;
pub use cleanup::Released;
pub use error::{ServerBuildError, ServerError};
pub use server::{Server, ServerBuilder, ServerOptions};
