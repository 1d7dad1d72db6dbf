use bytes::BufMut;

use crate::error::{FrameError, Result};

/// Payload capacity of one frame.
pub const MAX_FRAGMENT_SIZE: usize = 64;

/// Header: total length (2) + offset (2) + fragment length (1) = 5 bytes.
pub const HEADER_SIZE: usize = 5;

/// Trailing CRC-32 size.
pub const CHECKSUM_SIZE: usize = 4;

/// Wire size of every frame: header + payload capacity + checksum = 73 bytes.
pub const FRAME_SIZE: usize = HEADER_SIZE + MAX_FRAGMENT_SIZE + CHECKSUM_SIZE;

/// Largest message the 16-bit length field can describe.
pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

const CHECKSUM_OFFSET: usize = HEADER_SIZE + MAX_FRAGMENT_SIZE;

/// One fragment of a message, as carried on the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    /// Length of the whole message this fragment belongs to.
    pub total_length: u16,
    /// Byte offset of this fragment within the message.
    pub offset: u16,
    /// Number of meaningful bytes in `payload`.
    pub fragment_length: u8,
    /// Fixed-capacity payload. Bytes past `fragment_length` are padding.
    pub payload: [u8; MAX_FRAGMENT_SIZE],
}

impl Frame {
    /// Build a frame carrying `fragment` at `offset` of a `total_length` message.
    ///
    /// Padding bytes are zeroed.
    pub fn new(total_length: u16, offset: u16, fragment: &[u8]) -> Result<Self> {
        let end = offset as usize + fragment.len();
        if fragment.len() > MAX_FRAGMENT_SIZE || end > total_length as usize {
            return Err(FrameError::MalformedFragment {
                total_length: total_length as usize,
                offset: offset as usize,
                fragment_length: fragment.len(),
            });
        }

        let mut payload = [0u8; MAX_FRAGMENT_SIZE];
        payload[..fragment.len()].copy_from_slice(fragment);
        Ok(Self {
            total_length,
            offset,
            fragment_length: fragment.len() as u8,
            payload,
        })
    }

    /// The meaningful part of the payload.
    pub fn fragment(&self) -> &[u8] {
        &self.payload[..self.fragment_length as usize]
    }

    /// Offset one past the last byte of this fragment.
    pub fn end(&self) -> usize {
        self.offset as usize + self.fragment_length as usize
    }

    /// Whether this fragment opens a transfer.
    pub fn is_first(&self) -> bool {
        self.offset == 0
    }

    /// Whether this fragment completes the message.
    pub fn is_last(&self) -> bool {
        self.end() == self.total_length as usize
    }

    /// CRC-32/IEEE over the encoded header and the full payload array.
    pub fn checksum(&self) -> u32 {
        let bytes = self.to_bytes();
        checksum(&bytes[..CHECKSUM_OFFSET])
    }

    /// Encode into the fixed-size wire representation.
    ///
    /// Wire format (little-endian, packed):
    /// ```text
    /// ┌─────────────┬──────────┬──────────┬──────────────┬───────────┐
    /// │ Total (2B)  │ Offset   │ FragLen  │ Payload      │ CRC-32    │
    /// │ LE          │ (2B LE)  │ (1B)     │ (64B, padded)│ (4B LE)   │
    /// └─────────────┴──────────┴──────────┴──────────────┴───────────┘
    /// ```
    /// The CRC covers every byte before it, padding included.
    pub fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        let mut out = [0u8; FRAME_SIZE];
        out[0..2].copy_from_slice(&self.total_length.to_le_bytes());
        out[2..4].copy_from_slice(&self.offset.to_le_bytes());
        out[4] = self.fragment_length;
        out[HEADER_SIZE..CHECKSUM_OFFSET].copy_from_slice(&self.payload);
        let crc = checksum(&out[..CHECKSUM_OFFSET]);
        out[CHECKSUM_OFFSET..].copy_from_slice(&crc.to_le_bytes());
        out
    }

    /// Append the wire representation to `dst`.
    pub fn encode_into<B: BufMut>(&self, dst: &mut B) {
        dst.put_slice(&self.to_bytes());
    }

    /// Parse and validate one wire frame.
    ///
    /// The checksum is verified before any header field is interpreted.
    pub fn decode(src: &[u8]) -> Result<Self> {
        verify(src)?;
        let (total_length, offset, fragment_length) = header(src);

        let malformed = FrameError::MalformedFragment {
            total_length: total_length as usize,
            offset: offset as usize,
            fragment_length: fragment_length as usize,
        };
        if fragment_length as usize > MAX_FRAGMENT_SIZE {
            return Err(malformed);
        }
        let end = offset as usize + fragment_length as usize;
        if end > total_length as usize {
            return Err(FrameError::Overflow {
                offset: offset as usize,
                end,
                capacity: total_length as usize,
            });
        }
        // Only an empty message may carry an empty fragment.
        if fragment_length == 0 && total_length > 0 {
            return Err(malformed);
        }

        let mut payload = [0u8; MAX_FRAGMENT_SIZE];
        payload.copy_from_slice(&src[HEADER_SIZE..CHECKSUM_OFFSET]);
        Ok(Self {
            total_length,
            offset,
            fragment_length,
            payload,
        })
    }

    /// Copy the fragment into `dest` at its offset.
    ///
    /// Returns the number of bytes copied. Nothing is written on failure.
    pub fn copy_into(&self, dest: &mut [u8]) -> Result<usize> {
        let offset = self.offset as usize;
        let end = self.end();
        if end > dest.len() {
            return Err(FrameError::Overflow {
                offset,
                end,
                capacity: dest.len(),
            });
        }
        dest[offset..end].copy_from_slice(self.fragment());
        Ok(self.fragment_length as usize)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("total_length", &self.total_length)
            .field("offset", &self.offset)
            .field("fragment_length", &self.fragment_length)
            .finish_non_exhaustive()
    }
}

/// CRC-32 with the IEEE polynomial.
pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Check that `src` is exactly one frame with a matching checksum.
pub fn verify(src: &[u8]) -> Result<()> {
    if src.len() != FRAME_SIZE {
        return Err(FrameError::InvalidFrameSize {
            len: src.len(),
            expected: FRAME_SIZE,
        });
    }

    let stored = u32::from_le_bytes([
        src[CHECKSUM_OFFSET],
        src[CHECKSUM_OFFSET + 1],
        src[CHECKSUM_OFFSET + 2],
        src[CHECKSUM_OFFSET + 3],
    ]);
    let computed = checksum(&src[..CHECKSUM_OFFSET]);
    if stored != computed {
        return Err(FrameError::Integrity { stored, computed });
    }
    Ok(())
}

/// Validate a wire frame and copy its fragment into `dest`.
///
/// Fails with [`FrameError::Integrity`] on checksum mismatch and
/// [`FrameError::Overflow`] if the fragment would not fit in `dest`.
/// `dest` is untouched on every failure path.
pub fn deserialize_and_validate(src: &[u8], dest: &mut [u8]) -> Result<usize> {
    verify(src)?;
    let (_, offset, fragment_length) = header(src);
    let end = offset as usize + fragment_length as usize;
    if end > dest.len() {
        return Err(FrameError::Overflow {
            offset: offset as usize,
            end,
            capacity: dest.len(),
        });
    }
    Frame::decode(src)?.copy_into(dest)
}

/// Raw header fields of a frame already known to be `FRAME_SIZE` long.
fn header(src: &[u8]) -> (u16, u16, u8) {
    (
        u16::from_le_bytes([src[0], src[1]]),
        u16::from_le_bytes([src[2], src[3]]),
        src[4],
    )
}
