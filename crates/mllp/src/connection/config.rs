use crate::codec::DEFAULT_MAX_FRAME_SIZE;
use crate::handler::Middleware;
use crate::log::MessageLog;
use crate::protocol::{Hl7Parser, TextEncoding};
use std::fmt;
use std::sync::Arc;

/// The configuration every connection of a server shares.
#[derive(Clone)]
pub struct ConnectionConfig {
    pub(crate) log: Arc<dyn MessageLog>,
    pub(crate) middleware: Arc<dyn Middleware>,
    pub(crate) parser: Option<Arc<dyn Hl7Parser>>,
    pub(crate) encoding: TextEncoding,
    pub(crate) max_frame_size: usize,
}

impl ConnectionConfig {
    pub fn new(log: Arc<dyn MessageLog>, middleware: Arc<dyn Middleware>) -> Self {
        Self { log, middleware, parser: None, encoding: TextEncoding::default(), max_frame_size: DEFAULT_MAX_FRAME_SIZE }
    }

    pub fn parser(mut self, parser: Arc<dyn Hl7Parser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("log", &self.log)
            .field("parser", &self.parser)
            .field("encoding", &self.encoding)
            .field("max_frame_size", &self.max_frame_size)
            .finish_non_exhaustive()
    }
}
