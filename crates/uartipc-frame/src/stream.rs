//! `tokio_util::codec` adapter for links exposed as byte streams.
//!
//! The decoder only splits the stream into frame-sized chunks. Validation
//! stays with [`crate::Reassembler`] so a corrupt frame is reported and
//! skipped instead of terminating the stream.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{Frame, FRAME_SIZE};

/// Fixed-size frame codec for `FramedRead` / `FramedWrite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < FRAME_SIZE {
            src.reserve(FRAME_SIZE - src.len());
            return Ok(None);
        }
        Ok(Some(src.split_to(FRAME_SIZE).freeze()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("stream closed inside a frame ({} of {FRAME_SIZE} bytes)", src.len()),
            )),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = std::io::Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(FRAME_SIZE);
        frame.encode_into(dst);
        Ok(())
    }
}
