use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MllpError {
    #[error("frame error: {source}")]
    FrameError {
        #[from]
        source: FrameError,
    },

    #[error("send error: {source}")]
    SendError {
        #[from]
        source: SendError,
    },
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame size too large, current: {current_size} exceed the limit {max_size}")]
    TooLarge { current_size: usize, max_size: usize },

    #[error("stream ended inside a frame, {buffered} bytes were buffered")]
    Incomplete { buffered: usize },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl FrameError {
    pub fn too_large(current_size: usize, max_size: usize) -> Self {
        Self::TooLarge { current_size, max_size }
    }

    pub fn incomplete(buffered: usize) -> Self {
        Self::Incomplete { buffered }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Hl7ParseError {
    #[error("empty message")]
    Empty,

    #[error("message must start with an MSH segment, found {found:?}")]
    MissingHeader { found: String },

    #[error("invalid MSH segment: {reason}")]
    InvalidHeader { reason: String },
}

impl Hl7ParseError {
    pub fn missing_header<S: ToString>(found: S) -> Self {
        Self::MissingHeader { found: found.to_string() }
    }

    pub fn invalid_header<S: ToString>(reason: S) -> Self {
        Self::InvalidHeader { reason: reason.to_string() }
    }
}
