use crate::traits::RxBuffer;

/// Errors reported by a link transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The link is already transmitting or its receiver is already running.
    #[error("link busy")]
    Busy,

    /// The underlying device has not finished initialising.
    #[error("link device not ready")]
    NotReady,

    /// The receiver has not been enabled.
    #[error("receiver not enabled")]
    RxNotEnabled,

    /// The driver refused the request.
    #[error("request rejected by link: {0}")]
    Rejected(String),
}

/// A receive buffer handed back to the caller because the link refused it.
///
/// Keeps ownership with the caller on the error path so the buffer can be
/// returned to its pool.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct BufferRejected {
    /// The buffer the link did not take.
    pub buffer: RxBuffer,
    /// Why the link refused it.
    #[source]
    pub error: TransportError,
}

pub type Result<T> = std::result::Result<T, TransportError>;
