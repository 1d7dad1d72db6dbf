use bytes::Bytes;

use crate::codec::{Frame, FRAME_SIZE, MAX_FRAGMENT_SIZE, MAX_MESSAGE_SIZE};
use crate::error::{FrameError, Result};

/// Number of frames needed to carry a message of `len` bytes.
///
/// An empty message still occupies one frame so the receiver observes a
/// complete, zero-length transfer.
pub fn frame_count(len: usize) -> usize {
    len.div_ceil(MAX_FRAGMENT_SIZE).max(1)
}

/// Iterator over the frames of one message, in transmission order.
#[derive(Debug, Clone)]
pub struct Fragments<'a> {
    message: &'a [u8],
    next_offset: usize,
    remaining: usize,
}

/// Split `message` into frames.
pub fn fragments(message: &[u8]) -> Result<Fragments<'_>> {
    if message.len() > MAX_MESSAGE_SIZE {
        return Err(FrameError::MessageTooLarge {
            size: message.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(Fragments {
        message,
        next_offset: 0,
        remaining: frame_count(message.len()),
    })
}

impl Iterator for Fragments<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let start = self.next_offset;
        let end = (start + MAX_FRAGMENT_SIZE).min(self.message.len());
        self.next_offset = end;

        // Lengths were bounded by `fragments`, so the header always fits.
        Frame::new(
            self.message.len() as u16,
            start as u16,
            &self.message[start..end],
        )
        .ok()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Fragments<'_> {}

/// Serialize `message` into the contiguous wire buffer handed to the link.
///
/// Memory for the output is reserved up front and reported as
/// [`FrameError::OutOfMemory`] if unavailable.
pub fn serialize(message: &[u8]) -> Result<Bytes> {
    let frames = fragments(message)?;
    let size = frames.len() * FRAME_SIZE;

    let mut wire: Vec<u8> = Vec::new();
    wire.try_reserve_exact(size)
        .map_err(|_| FrameError::OutOfMemory { size })?;
    for frame in frames {
        frame.encode_into(&mut wire);
    }

    tracing::debug!(
        message_len = message.len(),
        frames = size / FRAME_SIZE,
        "serialized message"
    );
    Ok(Bytes::from(wire))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::deserialize_and_validate;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 + 7) as u8).collect()
    }

    #[test]
    fn frame_count_rounds_up() {
        assert_eq!(frame_count(0), 1);
        assert_eq!(frame_count(1), 1);
        assert_eq!(frame_count(64), 1);
        assert_eq!(frame_count(65), 2);
        assert_eq!(frame_count(3 * 64), 3);
    }

    #[test]
    fn exact_multiple_yields_full_fragments() {
        let message = pattern(3 * MAX_FRAGMENT_SIZE);
        let frames: Vec<Frame> = fragments(&message).unwrap().collect();

        assert_eq!(frames.len(), 3);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.fragment_length as usize, MAX_FRAGMENT_SIZE);
            assert_eq!(frame.offset as usize, i * MAX_FRAGMENT_SIZE);
            assert_eq!(frame.total_length as usize, message.len());
        }
        assert!(frames[2].is_last());
    }

    #[test]
    fn last_fragment_carries_remainder() {
        let message = pattern(3 * MAX_FRAGMENT_SIZE + 7);
        let frames: Vec<Frame> = fragments(&message).unwrap().collect();

        assert_eq!(frames.len(), 4);
        assert_eq!(frames[3].fragment_length, 7);
        assert_eq!(frames[3].offset as usize, 3 * MAX_FRAGMENT_SIZE);
        assert_eq!(frames[3].fragment(), &message[192..]);
    }

    #[test]
    fn empty_message_is_one_empty_frame() {
        let frames: Vec<Frame> = fragments(&[]).unwrap().collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].total_length, 0);
        assert_eq!(frames[0].offset, 0);
        assert_eq!(frames[0].fragment_length, 0);
        assert!(frames[0].is_first() && frames[0].is_last());
    }

    #[test]
    fn serialize_lays_frames_back_to_back() {
        let message = pattern(130);
        let wire = serialize(&message).unwrap();
        assert_eq!(wire.len(), 3 * FRAME_SIZE);

        let mut rebuilt = vec![0u8; message.len()];
        let total: usize = wire
            .chunks(FRAME_SIZE)
            .map(|chunk| deserialize_and_validate(chunk, &mut rebuilt).unwrap())
            .sum();
        assert_eq!(total, message.len());
        assert_eq!(rebuilt, message);
    }

    #[test]
    fn serialize_rejects_oversized_message() {
        let message = vec![0u8; MAX_MESSAGE_SIZE + 1];
        assert_eq!(
            serialize(&message).unwrap_err(),
            FrameError::MessageTooLarge {
                size: MAX_MESSAGE_SIZE + 1,
                max: MAX_MESSAGE_SIZE
            }
        );
    }

    #[test]
    fn largest_message_fits_header() {
        let message = vec![0xA5u8; MAX_MESSAGE_SIZE];
        let frames = fragments(&message).unwrap();
        assert_eq!(frames.len(), frame_count(MAX_MESSAGE_SIZE));
        let last = frames.last().unwrap();
        assert_eq!(last.end(), MAX_MESSAGE_SIZE);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Every length up to ten full fragments plus a remainder rebuilds exactly.
            #[test]
            fn prop_serialize_roundtrip(
                message in prop::collection::vec(any::<u8>(), 0..=(10 * MAX_FRAGMENT_SIZE + 17)),
            ) {
                let wire = serialize(&message).unwrap();
                prop_assert_eq!(wire.len(), frame_count(message.len()) * FRAME_SIZE);

                let mut rebuilt = vec![0u8; message.len()];
                let mut accepted = 0usize;
                for chunk in wire.chunks(FRAME_SIZE) {
                    accepted += deserialize_and_validate(chunk, &mut rebuilt).unwrap();
                }
                prop_assert_eq!(accepted, message.len());
                prop_assert_eq!(rebuilt, message);
            }
        }
    }
}
