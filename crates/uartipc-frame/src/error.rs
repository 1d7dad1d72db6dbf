/// Errors that can occur while framing, validating, or reassembling messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The stored checksum does not match the frame contents.
    #[error("CRC mismatch (stored {stored:#010x}, computed {computed:#010x}), fragment is likely corrupted")]
    Integrity { stored: u32, computed: u32 },

    /// Copying the fragment would write past the destination buffer.
    #[error("fragment {offset}..{end} overflows destination buffer of {capacity} bytes")]
    Overflow {
        offset: usize,
        end: usize,
        capacity: usize,
    },

    /// Received data is not exactly one frame long.
    #[error("received {len} bytes, not a valid frame (expected {expected})")]
    InvalidFrameSize { len: usize, expected: usize },

    /// A checksum-valid frame carries inconsistent lengths.
    #[error("malformed fragment: {fragment_length} bytes at offset {offset} of a {total_length}-byte message")]
    MalformedFragment {
        total_length: usize,
        offset: usize,
        fragment_length: usize,
    },

    /// The message cannot be described by the frame header.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Memory for frames or the reassembly buffer could not be obtained.
    #[error("could not allocate {size} bytes")]
    OutOfMemory { size: usize },

    /// A transfer must start with the fragment at offset 0.
    #[error("new transfer started, but fragment starts at byte {offset}")]
    UnexpectedFragment { offset: usize },

    /// The fragment does not continue the active transfer.
    #[error("fragment at byte {offset} does not follow the {expected} bytes received so far")]
    OutOfSequence { expected: usize, offset: usize },

    /// The fragment belongs to a transfer of a different length.
    #[error("fragment announces {actual} total bytes, active transfer expects {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    /// A start fragment replaced an unfinished transfer.
    #[error("transfer restarted, discarded {discarded} of {total} bytes")]
    TransferRestarted { discarded: usize, total: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
