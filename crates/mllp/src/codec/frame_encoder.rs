use crate::codec::{CARRIAGE_RETURN, END_BLOCK, START_BLOCK};
use crate::protocol::SendError;
use bytes::{BufMut, BytesMut};
use tokio_util::codec::Encoder;

/// Wraps each outgoing payload in MLLP start and end blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameEncoder;

impl FrameEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl<T: AsRef<[u8]>> Encoder<T> for FrameEncoder {
    type Error = SendError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = item.as_ref();
        dst.reserve(payload.len() + 3);
        dst.put_u8(START_BLOCK);
        dst.put_slice(payload);
        dst.put_slice(&[END_BLOCK, CARRIAGE_RETURN]);
        Ok(())
    }
}
