//! MLLP codec module
//!
//! MLLP delimits messages on a byte stream with a start block and an end block:
//!
//! ```text
//! <VT> payload <FS><CR>
//! 0x0B         0x1C 0x0D
//! ```
//!
//! - [`FrameDecoder`]: produces the payload of each complete frame, discarding noise between
//!   frames and bounding the frame size
//! - [`FrameEncoder`]: wraps outgoing payloads
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use micro_mllp::codec::{FrameDecoder, FrameEncoder};
//! use tokio_util::codec::{Decoder, Encoder};
//!
//! let mut buffer = BytesMut::new();
//! FrameEncoder.encode("MSH|^~\\&|APP", &mut buffer).unwrap();
//!
//! let payload = FrameDecoder::new().decode(&mut buffer).unwrap().unwrap();
//! assert_eq!(&payload[..], b"MSH|^~\\&|APP");
//! ```

mod frame_decoder;
mod frame_encoder;

pub use frame_decoder::DEFAULT_MAX_FRAME_SIZE;
pub use frame_decoder::FrameDecoder;
pub use frame_encoder::FrameEncoder;

pub const START_BLOCK: u8 = 0x0b;
pub const END_BLOCK: u8 = 0x1c;
pub const CARRIAGE_RETURN: u8 = 0x0d;
