use std::fmt;

use bytes::Bytes;

use crate::error::{BufferRejected, Result};

/// A fixed-size receive buffer lent to the link.
///
/// Ownership moves into the transport with [`LinkTransport::rx_enable`] or
/// [`LinkTransport::rx_buf_rsp`] and comes back through
/// [`LinkEvent::RxBufReleased`] or [`BufferRejected`].
pub struct RxBuffer {
    data: Box<[u8]>,
}

impl RxBuffer {
    /// Allocate a zeroed buffer of `size` bytes.
    ///
    /// Returns `None` when the allocator cannot provide the memory.
    pub fn try_new(size: usize) -> Option<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(size).ok()?;
        data.resize(size, 0);
        Some(Self {
            data: data.into_boxed_slice(),
        })
    }

    /// Buffer size in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl fmt::Debug for RxBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RxBuffer")
            .field("capacity", &self.data.len())
            .finish()
    }
}

/// Asynchronous notification delivered by the link.
///
/// Notifications arrive on a context the protocol does not control (an
/// interrupt or driver callback). Consumers must handle them without
/// blocking.
#[derive(Debug)]
pub enum LinkEvent {
    /// An accepted transmission finished.
    TxDone { len: usize },
    /// An accepted transmission was aborted before completion.
    TxAborted { len: usize },
    /// The receiver filled `data` from the active buffer.
    RxReady { data: Bytes },
    /// The receiver needs its next buffer.
    RxBufRequest,
    /// The receiver no longer uses `buffer`.
    RxBufReleased { buffer: RxBuffer },
    /// The receiver was disabled.
    RxDisabled,
    /// The receiver stopped because of a line error.
    RxStopped,
}

impl LinkEvent {
    /// Short event name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            LinkEvent::TxDone { .. } => "tx_done",
            LinkEvent::TxAborted { .. } => "tx_aborted",
            LinkEvent::RxReady { .. } => "rx_ready",
            LinkEvent::RxBufRequest => "rx_buf_request",
            LinkEvent::RxBufReleased { .. } => "rx_buf_released",
            LinkEvent::RxDisabled => "rx_disabled",
            LinkEvent::RxStopped => "rx_stopped",
        }
    }
}

/// The operations uartipc requires from a byte link.
///
/// Every method returns immediately. Completion is reported later through
/// [`LinkEvent`]s delivered by whoever drives the link.
pub trait LinkTransport {
    /// Whether the underlying device finished initialising.
    fn is_ready(&self) -> bool;

    /// Start transmitting `data`.
    ///
    /// An accepted transmission must be followed by exactly one
    /// [`LinkEvent::TxDone`] or [`LinkEvent::TxAborted`].
    fn transmit(&mut self, data: Bytes) -> Result<()>;

    /// Enable the receiver with its first buffer.
    fn rx_enable(&mut self, buffer: RxBuffer) -> std::result::Result<(), BufferRejected>;

    /// Answer a [`LinkEvent::RxBufRequest`] with the next buffer.
    fn rx_buf_rsp(&mut self, buffer: RxBuffer) -> std::result::Result<(), BufferRejected>;
}

impl<T: LinkTransport + ?Sized> LinkTransport for Box<T> {
    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn transmit(&mut self, data: Bytes) -> Result<()> {
        (**self).transmit(data)
    }

    fn rx_enable(&mut self, buffer: RxBuffer) -> std::result::Result<(), BufferRejected> {
        (**self).rx_enable(buffer)
    }

    fn rx_buf_rsp(&mut self, buffer: RxBuffer) -> std::result::Result<(), BufferRejected> {
        (**self).rx_buf_rsp(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rx_buffer_is_zeroed_with_requested_capacity() {
        let buffer = RxBuffer::try_new(73).expect("small buffer should allocate");
        assert_eq!(buffer.capacity(), 73);
        assert!(buffer.as_slice().iter().all(|b| *b == 0));
    }

    #[test]
    fn rx_buffer_is_writable() {
        let mut buffer = RxBuffer::try_new(4).unwrap();
        buffer.as_mut_slice().copy_from_slice(b"uart");
        assert_eq!(buffer.as_slice(), b"uart");
    }

    #[test]
    fn rx_buffer_allocation_failure_is_reported() {
        assert!(RxBuffer::try_new(usize::MAX).is_none());
    }

    #[test]
    fn rx_buffer_debug_hides_contents() {
        let buffer = RxBuffer::try_new(8).unwrap();
        assert_eq!(format!("{buffer:?}"), "RxBuffer { capacity: 8 }");
    }

    #[test]
    fn event_names() {
        assert_eq!(LinkEvent::TxDone { len: 1 }.name(), "tx_done");
        assert_eq!(LinkEvent::RxBufRequest.name(), "rx_buf_request");
        assert_eq!(
            LinkEvent::RxReady {
                data: Bytes::from_static(b"x")
            }
            .name(),
            "rx_ready"
        );
    }
}
