//! Core MLLP protocol types.
//!
//! - **Requests** ([`MllpRequest`]): one decoded inbound message with its peer address and the
//!   optional parser
//! - **Text encoding** ([`TextEncoding`]): how frame bytes become message text and back
//! - **HL7** ([`Hl7Parser`], [`SegmentParser`], [`Hl7Message`]): a minimal segment/field model
//! - **Errors**:
//!   - [`MllpError`]: top-level error of a connection
//!   - [`FrameError`]: frame decoding errors
//!   - [`SendError`]: frame sending errors
//!   - [`Hl7ParseError`]: message parsing errors

mod encoding;
pub use encoding::TextEncoding;

mod hl7;
pub use hl7::Hl7Message;
pub use hl7::Hl7Parser;
pub use hl7::Segment;
pub use hl7::SegmentParser;

mod request;
pub use request::MllpRequest;

mod error;
pub use error::FrameError;
pub use error::Hl7ParseError;
pub use error::MllpError;
pub use error::SendError;
