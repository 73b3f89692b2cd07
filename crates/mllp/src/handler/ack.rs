use crate::handler::{BoxError, Middleware};
use crate::protocol::{Hl7Message, Hl7ParseError, Hl7Parser, MllpRequest, SegmentParser};
use async_trait::async_trait;
use chrono::Local;
use std::sync::Arc;
use tracing::warn;

const DEFAULT_ENCODING_CHARACTERS: &str = "^~\\&";
const DEFAULT_VERSION: &str = "2.5";
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Answers every message with an HL7 original-mode acknowledgement.
///
/// A message that parses is accepted (`MSA|AA`), echoing its control id; one that does not is
/// rejected (`MSA|AR`) with the parse error as text. The request's parser is used when the
/// connection has one, [`SegmentParser`] otherwise.
#[derive(Debug, Clone)]
pub struct AckMiddleware {
    fallback: Arc<dyn Hl7Parser>,
}

impl AckMiddleware {
    pub fn new() -> Self {
        Self { fallback: Arc::new(SegmentParser) }
    }

    pub fn acknowledge(message: &Hl7Message, timestamp: &str) -> String {
        let f = message.field_separator();
        let encoding_characters = message.encoding_characters().unwrap_or(DEFAULT_ENCODING_CHARACTERS);
        let message_type = match message.trigger_event() {
            Some(trigger) => format!("ACK{}{trigger}", message.component_separator()),
            None => "ACK".to_owned(),
        };
        let control_id = message.control_id().unwrap_or_default();

        format!(
            "MSH{f}{encoding_characters}{f}{}{f}{}{f}{}{f}{}{f}{timestamp}{f}{f}{message_type}{f}{control_id}{f}{}{f}{}\r\
             MSA{f}AA{f}{control_id}\r",
            message.receiving_application().unwrap_or_default(),
            message.receiving_facility().unwrap_or_default(),
            message.sending_application().unwrap_or_default(),
            message.sending_facility().unwrap_or_default(),
            message.processing_id().unwrap_or("P"),
            message.version().unwrap_or(DEFAULT_VERSION),
        )
    }

    pub fn reject(error: &Hl7ParseError, timestamp: &str) -> String {
        let reason = error.to_string().replace(['|', '\r', '\n'], " ");
        format!(
            "MSH|{DEFAULT_ENCODING_CHARACTERS}|||||{timestamp}||ACK|{timestamp}|P|{DEFAULT_VERSION}\rMSA|AR||{reason}\r"
        )
    }
}

impl Default for AckMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for AckMiddleware {
    async fn handle(&self, request: MllpRequest) -> Result<Option<String>, BoxError> {
        let parsed = request.parse().unwrap_or_else(|| self.fallback.parse(request.text()));
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();

        let ack = match parsed {
            Ok(message) => Self::acknowledge(&message, &timestamp),
            Err(e) => {
                warn!(peer = %request.peer(), cause = %e, "reject unparsable message");
                Self::reject(&e, &timestamp)
            }
        };
        Ok(Some(ack))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    const ORU: &str = "MSH|^~\\&|LAB|HOSP|EHR|CLINIC|20240101120000||ORU^R01|MSG00001|T|2.3\rPID|1\r";

    #[test]
    fn acknowledge_swaps_sender_and_receiver() {
        let message = SegmentParser.parse(ORU).unwrap();
        let ack = AckMiddleware::acknowledge(&message, "20240101120001");

        assert_eq!(
            ack,
            "MSH|^~\\&|EHR|CLINIC|LAB|HOSP|20240101120001||ACK^R01|MSG00001|T|2.3\rMSA|AA|MSG00001\r"
        );
    }

    #[test]
    fn reject_escapes_separators() {
        let ack = AckMiddleware::reject(&Hl7ParseError::missing_header("PI|"), "20240101120001");

        assert!(ack.starts_with("MSH|^~\\&|||||20240101120001||ACK|"));
        assert!(ack.ends_with("MSA|AR||message must start with an MSH segment, found \"PI \"\r"));
    }

    #[tokio::test]
    async fn handle_without_connection_parser() {
        let request = MllpRequest::new(SocketAddr::from(([127, 0, 0, 1], 1)), ORU.to_owned(), None);
        let ack = AckMiddleware::new().handle(request).await.unwrap().unwrap();

        let ack = SegmentParser.parse(&ack).unwrap();
        assert_eq!(ack.message_type(), Some("ACK^R01"));
        assert_eq!(ack.segment("MSA").and_then(|msa| msa.field(1)), Some("AA"));
        assert_eq!(ack.segment("MSA").and_then(|msa| msa.field(2)), Some("MSG00001"));
    }

    #[tokio::test]
    async fn handle_garbage() {
        let request = MllpRequest::new(SocketAddr::from(([127, 0, 0, 1], 1)), "hello".to_owned(), None);
        let ack = AckMiddleware::new().handle(request).await.unwrap().unwrap();

        assert!(ack.contains("MSA|AR||"));
    }
}
