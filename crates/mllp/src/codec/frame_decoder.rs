//! MLLP frame decoder
//!
//! An MLLP frame is a start block byte (`0x0B`), the message payload, and an end block made
//! of `0x1C` followed by a carriage return (`0x0D`). Bytes received outside of a frame carry no
//! meaning and are discarded.

use crate::codec::{CARRIAGE_RETURN, END_BLOCK, START_BLOCK};
use crate::ensure;
use crate::protocol::FrameError;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::warn;

/// The default upper bound of a single frame payload: 1 MiB
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// A decoder producing the payload of each complete MLLP frame
///
/// The decoder remembers how far into the buffered frame it has already scanned, so a large
/// message arriving in many small reads is not rescanned from the start every time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDecoder {
    max_frame_size: usize,
    scanned: usize,
}

enum Scan {
    /// the payload ends at this offset
    Complete(usize),
    /// another start block at this offset begins a new frame
    Restart(usize),
    /// need more bytes, everything before this offset is plain payload
    Partial(usize),
}

impl FrameDecoder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size, scanned: 0 }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Scans the payload (the bytes after the start block) for the end of the frame.
    fn scan(&self, payload: &[u8]) -> Scan {
        let mut index = self.scanned;
        while index < payload.len() {
            match payload[index] {
                START_BLOCK => return Scan::Restart(index),
                END_BLOCK => match payload.get(index + 1) {
                    Some(&CARRIAGE_RETURN) => return Scan::Complete(index),
                    Some(_) => index += 1,
                    None => return Scan::Partial(index),
                },
                _ => index += 1,
            }
        }
        Scan::Partial(index)
    }

    /// Drops everything before the next start block, returns false if there is none.
    fn seek_start_block(src: &mut BytesMut) -> bool {
        match src.iter().position(|b| *b == START_BLOCK) {
            Some(0) => true,
            Some(skipped) => {
                warn!(skipped, "discard bytes received outside of a frame");
                src.advance(skipped);
                true
            }
            None => {
                if !src.is_empty() {
                    warn!(skipped = src.len(), "discard bytes received outside of a frame");
                    src.clear();
                }
                false
            }
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameDecoder {
    type Item = Bytes;
    type Error = FrameError;

    /// Attempts to decode one frame from the buffer
    ///
    /// # Returns
    ///
    /// - `Ok(Some(payload))`: a complete frame, without its start and end blocks
    /// - `Ok(None)`: need more data to proceed
    /// - `Err(FrameError::TooLarge)`: the frame exceeds the configured maximum
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.scanned == 0 && !Self::seek_start_block(src) {
                return Ok(None);
            }

            match self.scan(&src[1..]) {
                Scan::Complete(end) => {
                    ensure!(end <= self.max_frame_size, FrameError::too_large(end, self.max_frame_size));

                    self.scanned = 0;
                    src.advance(1);
                    let payload = src.split_to(end).freeze();
                    src.advance(2);
                    return Ok(Some(payload));
                }

                Scan::Restart(offset) => {
                    warn!(discarded = offset, "start block inside an unterminated frame, restart frame");
                    self.scanned = 0;
                    src.advance(offset + 1);
                }

                Scan::Partial(scanned) => {
                    ensure!(scanned <= self.max_frame_size, FrameError::too_large(scanned, self.max_frame_size));

                    self.scanned = scanned;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(payload) => Ok(Some(payload)),
            None if src.is_empty() => Ok(None),
            None => {
                let buffered = src.len();
                self.scanned = 0;
                src.clear();
                Err(FrameError::incomplete(buffered))
            }
        }
    }
}
