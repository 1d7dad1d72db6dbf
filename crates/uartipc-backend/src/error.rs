use std::time::Duration;

use uartipc_frame::FrameError;
use uartipc_transport::TransportError;

/// Errors returned by backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// An endpoint is already registered on this instance.
    #[error("endpoint \"{0}\" already registered")]
    AlreadyRegistered(String),

    /// The instance has already been opened.
    #[error("instance already open")]
    AlreadyOpen,

    /// The underlying link device is not ready.
    #[error("link device not ready")]
    DeviceNotReady,

    /// Memory for buffers could not be obtained.
    #[error("out of memory")]
    OutOfMemory,

    /// A transmission is already in flight.
    #[error("send already in progress")]
    Busy,

    /// No endpoint has been registered.
    #[error("no endpoint registered")]
    NotRegistered,

    /// The link rejected the request.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The worker queue cannot take another request right now.
    #[error("worker queue full")]
    QueueFull,

    /// The worker thread has exited.
    #[error("worker stopped")]
    WorkerStopped,

    /// The worker thread could not be started.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BackendError>;

/// Coarse classification of errors delivered to an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Resource exhaustion.
    OutOfMemory,
    /// Checksum mismatch.
    Integrity,
    /// Fragment would exceed its destination.
    Overflow,
    /// Malformed, misplaced, or wrong-size data.
    Protocol,
    /// Reassembly inactivity window elapsed.
    Timeout,
    /// The link rejected, aborted, or stopped work.
    Transport,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::OutOfMemory => "out_of_memory",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Overflow => "overflow",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Transport => "transport",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error reported to the endpoint's error callback.
///
/// None of these are fatal; the backend keeps running after each.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// Frame validation or reassembly failed.
    #[error("failed to receive frame: {0}")]
    Frame(#[from] FrameError),

    /// No frame arrived within the inactivity window.
    #[error("transfer timed out waiting for next frame ({received} of {total} bytes, idle {idle:?})")]
    Timeout {
        received: usize,
        total: usize,
        idle: Duration,
    },

    /// Frame memory for an outgoing message could not be obtained.
    #[error("could not allocate memory for data frames")]
    OutOfMemory,

    /// The link refused a transmission or buffer.
    #[error("link request failed: {0}")]
    Transport(#[from] TransportError),

    /// An accepted transmission was aborted.
    #[error("sending data was aborted ({len} bytes)")]
    TxAborted { len: usize },

    /// No receive buffer was free when the link asked for one.
    #[error("no receive buffer available, receiving will be interrupted")]
    RxBufferExhausted,

    /// The link disabled its receiver.
    #[error("receiving was disabled")]
    RxDisabled,

    /// The link stopped its receiver.
    #[error("receiving was stopped")]
    RxStopped,
}

impl LinkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LinkError::Frame(err) => match err {
                FrameError::Integrity { .. } => ErrorKind::Integrity,
                FrameError::Overflow { .. } => ErrorKind::Overflow,
                FrameError::OutOfMemory { .. } => ErrorKind::OutOfMemory,
                FrameError::InvalidFrameSize { .. }
                | FrameError::MalformedFragment { .. }
                | FrameError::MessageTooLarge { .. }
                | FrameError::UnexpectedFragment { .. }
                | FrameError::OutOfSequence { .. }
                | FrameError::LengthMismatch { .. }
                | FrameError::TransferRestarted { .. } => ErrorKind::Protocol,
            },
            LinkError::Timeout { .. } => ErrorKind::Timeout,
            LinkError::OutOfMemory | LinkError::RxBufferExhausted => ErrorKind::OutOfMemory,
            LinkError::Transport(_)
            | LinkError::TxAborted { .. }
            | LinkError::RxDisabled
            | LinkError::RxStopped => ErrorKind::Transport,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_errors_map_to_kinds() {
        let integrity = LinkError::from(FrameError::Integrity {
            stored: 1,
            computed: 2,
        });
        assert_eq!(integrity.kind(), ErrorKind::Integrity);

        let overflow = LinkError::from(FrameError::Overflow {
            offset: 0,
            end: 9,
            capacity: 8,
        });
        assert_eq!(overflow.kind(), ErrorKind::Overflow);

        let wrong_size = LinkError::from(FrameError::InvalidFrameSize {
            len: 72,
            expected: 73,
        });
        assert_eq!(wrong_size.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn link_errors_map_to_kinds() {
        let timeout = LinkError::Timeout {
            received: 64,
            total: 100,
            idle: Duration::from_millis(100),
        };
        assert_eq!(timeout.kind(), ErrorKind::Timeout);
        assert_eq!(LinkError::RxBufferExhausted.kind(), ErrorKind::OutOfMemory);
        assert_eq!(LinkError::TxAborted { len: 73 }.kind(), ErrorKind::Transport);
        assert_eq!(
            LinkError::from(TransportError::Busy).kind(),
            ErrorKind::Transport
        );
    }

    #[test]
    fn messages_are_descriptive() {
        let err = LinkError::Frame(FrameError::InvalidFrameSize {
            len: 72,
            expected: 73,
        });
        assert_eq!(
            err.to_string(),
            "failed to receive frame: received 72 bytes, not a valid frame (expected 73)"
        );
        assert_eq!(
            BackendError::AlreadyRegistered("ipc0".to_string()).to_string(),
            "endpoint \"ipc0\" already registered"
        );
    }
}
