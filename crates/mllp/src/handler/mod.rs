//! Message handling
//!
//! Every decoded message is passed to a [`Middleware`]. Whatever text the middleware returns is
//! encoded and written back to the peer as one frame; returning `None` sends nothing.
//!
//! Async functions and closures become middleware through [`middleware_fn`]:
//!
//! ```
//! use micro_mllp::handler::middleware_fn;
//! use micro_mllp::protocol::MllpRequest;
//!
//! let echo = middleware_fn(|request: MllpRequest| async move {
//!     Ok::<_, std::io::Error>(Some(request.into_text()))
//! });
//! ```

mod ack;

pub use ack::AckMiddleware;

use crate::protocol::MllpRequest;
use async_trait::async_trait;
use std::error::Error;
use std::future::Future;

pub type BoxError = Box<dyn Error + Send + Sync>;

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, request: MllpRequest) -> Result<Option<String>, BoxError>;
}

#[derive(Debug)]
pub struct MiddlewareFn<F> {
    f: F,
}

#[async_trait]
impl<F, Fut, Err> Middleware for MiddlewareFn<F>
where
    F: Fn(MllpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<String>, Err>> + Send + 'static,
    Err: Into<BoxError> + 'static,
{
    async fn handle(&self, request: MllpRequest) -> Result<Option<String>, BoxError> {
        (self.f)(request).await.map_err(Into::into)
    }
}

pub fn middleware_fn<F, Fut, Err>(f: F) -> MiddlewareFn<F>
where
    F: Fn(MllpRequest) -> Fut,
    Fut: Future<Output = Result<Option<String>, Err>>,
    Err: Into<BoxError>,
{
    MiddlewareFn { f }
}
