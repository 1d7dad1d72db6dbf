//! Fragment framing and reassembly for MTU-limited serial links.
//!
//! This is the core value-add layer of uartipc. A message of up to
//! 65535 bytes travels as a run of fixed 73-byte frames, each carrying:
//! - the total message length and the fragment's byte offset
//! - up to 64 payload bytes, zero-padded to full capacity
//! - a CRC-32 (IEEE) over everything before it
//!
//! The receive side rebuilds one message at a time, rejecting corrupt,
//! overflowing, or out-of-sequence fragments and expiring stalled transfers.

pub mod codec;
pub mod error;
pub mod fragment;
pub mod reassembly;

#[cfg(feature = "async")]
pub mod stream;

pub use codec::{
    checksum, deserialize_and_validate, verify, Frame, CHECKSUM_SIZE, FRAME_SIZE, HEADER_SIZE,
    MAX_FRAGMENT_SIZE, MAX_MESSAGE_SIZE,
};
pub use error::{FrameError, Result};
pub use fragment::{frame_count, fragments, serialize, Fragments};
pub use reassembly::{Accepted, Expired, ReassemblyState, Reassembler};

#[cfg(feature = "async")]
pub use stream::FrameCodec;
