//! A minimal HL7 v2 message model
//!
//! Only what the connection layer and the acknowledgement middleware need: segments, fields
//! and the few MSH fields that identify a message. Components, repetitions and escapes are left
//! to the application.

use crate::protocol::Hl7ParseError;
use std::fmt::Debug;

/// Parses message text into an [`Hl7Message`].
///
/// The connection layer never calls the parser itself, it hands it to the middleware through
/// [`MllpRequest::parse`](crate::protocol::MllpRequest::parse).
pub trait Hl7Parser: Send + Sync + Debug {
    fn parse(&self, text: &str) -> Result<Hl7Message, Hl7ParseError>;
}

/// Splits a message into segments on `\r` (or `\n`) and into fields on the separator declared
/// in MSH-1.
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentParser;

impl Hl7Parser for SegmentParser {
    fn parse(&self, text: &str) -> Result<Hl7Message, Hl7ParseError> {
        let mut lines = text.split(['\r', '\n']).filter(|line| !line.trim().is_empty());

        let header = lines.next().ok_or(Hl7ParseError::Empty)?;
        if !header.starts_with("MSH") {
            return Err(Hl7ParseError::missing_header(header.get(..3).unwrap_or(header)));
        }

        let mut chars = header[3..].chars();
        let field_separator = chars.next().ok_or_else(|| Hl7ParseError::invalid_header("missing field separator"))?;
        let component_separator =
            chars.next().ok_or_else(|| Hl7ParseError::invalid_header("missing encoding characters"))?;
        if field_separator.is_alphanumeric() || component_separator == field_separator {
            return Err(Hl7ParseError::invalid_header(format!("invalid separators {field_separator:?} {component_separator:?}")));
        }

        let mut segments = Vec::new();
        segments.push(Segment::header(header, field_separator));
        segments.extend(lines.map(|line| Segment::parse(line, field_separator)));

        Ok(Hl7Message { field_separator, component_separator, segments })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// `fields[0]` is the segment name so that `fields[n]` is field n in HL7 numbering
    fields: Vec<String>,
}

impl Segment {
    fn parse(line: &str, field_separator: char) -> Self {
        Self { fields: line.split(field_separator).map(str::to_owned).collect() }
    }

    /// MSH-1 is the field separator itself, it does not appear between separators.
    fn header(line: &str, field_separator: char) -> Self {
        let mut fields = vec!["MSH".to_owned(), field_separator.to_string()];
        fields.extend(line.split(field_separator).skip(1).map(str::to_owned));
        Self { fields }
    }

    pub fn name(&self) -> &str {
        &self.fields[0]
    }

    /// Returns field `index` in HL7 numbering, `None` when absent or empty.
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str).filter(|field| !field.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hl7Message {
    field_separator: char,
    component_separator: char,
    segments: Vec<Segment>,
}

impl Hl7Message {
    pub fn field_separator(&self) -> char {
        self.field_separator
    }

    pub fn component_separator(&self) -> char {
        self.component_separator
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The first segment with the given name
    pub fn segment(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|segment| segment.name() == name)
    }

    /// Field `index` of the first `segment`, in HL7 numbering.
    pub fn field(&self, segment: &str, index: usize) -> Option<&str> {
        self.segment(segment)?.field(index)
    }

    pub fn header(&self) -> &Segment {
        // a message is only built with its MSH segment in first position
        &self.segments[0]
    }

    /// MSH-2
    pub fn encoding_characters(&self) -> Option<&str> {
        self.header().field(2)
    }

    /// MSH-3
    pub fn sending_application(&self) -> Option<&str> {
        self.header().field(3)
    }

    /// MSH-4
    pub fn sending_facility(&self) -> Option<&str> {
        self.header().field(4)
    }

    /// MSH-5
    pub fn receiving_application(&self) -> Option<&str> {
        self.header().field(5)
    }

    /// MSH-6
    pub fn receiving_facility(&self) -> Option<&str> {
        self.header().field(6)
    }

    /// MSH-9, e.g. `ADT^A01^ADT_A01`
    pub fn message_type(&self) -> Option<&str> {
        self.header().field(9)
    }

    /// The trigger event, second component of MSH-9
    pub fn trigger_event(&self) -> Option<&str> {
        self.message_type()?.split(self.component_separator).nth(1).filter(|event| !event.is_empty())
    }

    /// MSH-10
    pub fn control_id(&self) -> Option<&str> {
        self.header().field(10)
    }

    /// MSH-11
    pub fn processing_id(&self) -> Option<&str> {
        self.header().field(11)
    }

    /// MSH-12
    pub fn version(&self) -> Option<&str> {
        self.header().field(12)
    }
}
