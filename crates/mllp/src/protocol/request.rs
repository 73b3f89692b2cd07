use crate::protocol::{Hl7Message, Hl7ParseError, Hl7Parser};
use std::net::SocketAddr;
use std::sync::Arc;

/// One decoded inbound message, as handed to the [`Middleware`](crate::handler::Middleware).
#[derive(Debug, Clone)]
pub struct MllpRequest {
    peer: SocketAddr,
    text: String,
    parser: Option<Arc<dyn Hl7Parser>>,
}

impl MllpRequest {
    pub fn new(peer: SocketAddr, text: String, parser: Option<Arc<dyn Hl7Parser>>) -> Self {
        Self { peer, text, parser }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    pub fn parser(&self) -> Option<&Arc<dyn Hl7Parser>> {
        self.parser.as_ref()
    }

    /// Parses the message text with the configured parser, `None` when no parser is configured.
    pub fn parse(&self) -> Option<Result<Hl7Message, Hl7ParseError>> {
        self.parser.as_ref().map(|parser| parser.parse(&self.text))
    }
}
