//! `tokio_util` codec adapter for driving frames from async tasks.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{Frame, FRAME_SIZE};
use crate::resync::{ResyncStats, Resynchronizer};

/// Frame codec for `tokio_util::codec::Framed`.
///
/// Decoding runs the same resynchronizer as the blocking transports, so
/// garbage between frames is skipped rather than reported as an error.
#[derive(Debug, Default)]
pub struct PacketCodec {
    resync: Resynchronizer,
}

impl PacketCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> ResyncStats {
        self.resync.stats()
    }
}

impl Decoder for PacketCodec {
    type Item = Frame;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Self::Error> {
        while src.has_remaining() {
            let byte = src.get_u8();
            if let Some(frame) = self.resync.push_byte(byte) {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }
}

impl Encoder<Frame> for PacketCodec {
    type Error = std::io::Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(FRAME_SIZE);
        dst.put_slice(frame.as_bytes());
        Ok(())
    }
}
