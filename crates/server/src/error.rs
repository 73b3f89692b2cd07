use micro_mllp::tls::TlsError;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::runtime::TryCurrentError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("a server must be created inside a tokio runtime: {0}")]
    Runtime(#[from] TryCurrentError),

    #[error("can't bind {address}: {source}")]
    Bind { address: SocketAddr, source: io::Error },

    #[error("can't listen on {address}: {source}")]
    Listen { address: SocketAddr, source: io::Error },

    #[error("server already started")]
    AlreadyStarted,

    #[error("server already stopped")]
    Stopped,

    #[error("accept failed after {attempts} attempts: {source}")]
    Accept { attempts: u32, source: io::Error },
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("address must be set")]
    MissingAddress,

    #[error("message log must be set")]
    MissingLogSink,

    #[error("middleware must be set")]
    MissingMiddleware,

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Server(#[from] ServerError),
}
