use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::error::{BufferRejected, Result, TransportError};
use crate::traits::{LinkTransport, RxBuffer};

/// In-memory link that records transmissions instead of driving hardware.
///
/// Completion events are not generated here; whoever plays the role of the
/// driver feeds [`crate::LinkEvent`]s to the consumer, using a
/// [`LoopbackProbe`] to inspect and steer the link.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    shared: Arc<Mutex<LoopbackState>>,
}

/// Observer and fault injector for a [`LoopbackTransport`].
#[derive(Debug, Clone)]
pub struct LoopbackProbe {
    shared: Arc<Mutex<LoopbackState>>,
}

#[derive(Debug)]
struct LoopbackState {
    ready: bool,
    rx_enabled: bool,
    transmit_calls: usize,
    transmitted: VecDeque<Bytes>,
    rx_buffers: VecDeque<RxBuffer>,
    reject_transmit: bool,
    reject_rx_buf: bool,
}

impl Default for LoopbackState {
    fn default() -> Self {
        Self {
            ready: true,
            rx_enabled: false,
            transmit_calls: 0,
            transmitted: VecDeque::new(),
            rx_buffers: VecDeque::new(),
            reject_transmit: false,
            reject_rx_buf: false,
        }
    }
}

fn lock(shared: &Mutex<LoopbackState>) -> MutexGuard<'_, LoopbackState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a probe sharing this link's state.
    pub fn probe(&self) -> LoopbackProbe {
        LoopbackProbe {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl LinkTransport for LoopbackTransport {
    fn is_ready(&self) -> bool {
        lock(&self.shared).ready
    }

    fn transmit(&mut self, data: Bytes) -> Result<()> {
        let mut state = lock(&self.shared);
        state.transmit_calls += 1;
        if !state.ready {
            return Err(TransportError::NotReady);
        }
        if state.reject_transmit {
            state.reject_transmit = false;
            return Err(TransportError::Rejected("injected transmit failure".to_string()));
        }
        debug!(len = data.len(), "loopback transmit");
        state.transmitted.push_back(data);
        Ok(())
    }

    fn rx_enable(&mut self, buffer: RxBuffer) -> std::result::Result<(), BufferRejected> {
        let mut state = lock(&self.shared);
        if state.rx_enabled {
            return Err(BufferRejected {
                buffer,
                error: TransportError::Busy,
            });
        }
        if !state.ready {
            return Err(BufferRejected {
                buffer,
                error: TransportError::NotReady,
            });
        }
        state.rx_enabled = true;
        state.rx_buffers.push_back(buffer);
        Ok(())
    }

    fn rx_buf_rsp(&mut self, buffer: RxBuffer) -> std::result::Result<(), BufferRejected> {
        let mut state = lock(&self.shared);
        if !state.rx_enabled {
            return Err(BufferRejected {
                buffer,
                error: TransportError::RxNotEnabled,
            });
        }
        if state.reject_rx_buf {
            state.reject_rx_buf = false;
            return Err(BufferRejected {
                buffer,
                error: TransportError::Rejected("injected buffer response failure".to_string()),
            });
        }
        state.rx_buffers.push_back(buffer);
        Ok(())
    }
}

impl LoopbackProbe {
    /// Mark the device ready or not ready.
    pub fn set_ready(&self, ready: bool) {
        lock(&self.shared).ready = ready;
    }

    /// Make the next `transmit` call fail.
    pub fn reject_next_transmit(&self) {
        lock(&self.shared).reject_transmit = true;
    }

    /// Make the next `rx_buf_rsp` call fail.
    pub fn reject_next_rx_buf(&self) {
        lock(&self.shared).reject_rx_buf = true;
    }

    /// Number of `transmit` calls, accepted or not.
    pub fn transmit_calls(&self) -> usize {
        lock(&self.shared).transmit_calls
    }

    /// Whether `rx_enable` succeeded.
    pub fn rx_enabled(&self) -> bool {
        lock(&self.shared).rx_enabled
    }

    /// Simulate the driver disabling its receiver.
    pub fn disable_rx(&self) {
        lock(&self.shared).rx_enabled = false;
    }

    /// Number of receive buffers currently held by the link.
    pub fn held_rx_buffers(&self) -> usize {
        lock(&self.shared).rx_buffers.len()
    }

    /// Hand back the oldest held receive buffer, as the driver does once it
    /// has drained it.
    pub fn release_rx_buffer(&self) -> Option<RxBuffer> {
        lock(&self.shared).rx_buffers.pop_front()
    }

    /// Drain accepted transmissions in order.
    pub fn take_transmitted(&self) -> Vec<Bytes> {
        lock(&self.shared).transmitted.drain(..).collect()
    }

    /// Drain accepted transmissions and re-split them into `chunk`-sized
    /// pieces, the way a receiver with `chunk`-sized buffers would see them.
    ///
    /// A trailing piece shorter than `chunk` is returned as-is. A zero
    /// `chunk` returns nothing and leaves the transmissions queued.
    pub fn take_chunks(&self, chunk: usize) -> Vec<Bytes> {
        if chunk == 0 {
            return Vec::new();
        }
        let mut wire = BytesMut::new();
        for data in self.take_transmitted() {
            wire.extend_from_slice(&data);
        }
        let mut chunks = Vec::with_capacity(wire.len().div_ceil(chunk));
        while !wire.is_empty() {
            let take = chunk.min(wire.len());
            chunks.push(wire.split_to(take).freeze());
        }
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transmit_records_data() {
        let mut link = LoopbackTransport::new();
        let probe = link.probe();

        link.transmit(Bytes::from_static(b"abc")).unwrap();
        link.transmit(Bytes::from_static(b"def")).unwrap();

        assert_eq!(probe.transmit_calls(), 2);
        assert_eq!(
            probe.take_transmitted(),
            vec![Bytes::from_static(b"abc"), Bytes::from_static(b"def")]
        );
        assert!(probe.take_transmitted().is_empty());
    }

    #[test]
    fn injected_transmit_failure_is_one_shot() {
        let mut link = LoopbackTransport::new();
        let probe = link.probe();
        probe.reject_next_transmit();

        let err = link.transmit(Bytes::from_static(b"x")).unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));
        link.transmit(Bytes::from_static(b"y")).unwrap();
        assert_eq!(probe.transmit_calls(), 2);
        assert_eq!(probe.take_transmitted().len(), 1);
    }

    #[test]
    fn not_ready_link_refuses_work() {
        let mut link = LoopbackTransport::new();
        let probe = link.probe();
        probe.set_ready(false);

        assert!(!link.is_ready());
        assert_eq!(
            link.transmit(Bytes::from_static(b"x")).unwrap_err(),
            TransportError::NotReady
        );
        let rejected = link.rx_enable(RxBuffer::try_new(8).unwrap()).unwrap_err();
        assert_eq!(rejected.error, TransportError::NotReady);
        assert_eq!(rejected.buffer.capacity(), 8);
    }

    #[test]
    fn rx_enable_twice_is_busy() {
        let mut link = LoopbackTransport::new();
        let probe = link.probe();

        link.rx_enable(RxBuffer::try_new(8).unwrap()).unwrap();
        let rejected = link.rx_enable(RxBuffer::try_new(8).unwrap()).unwrap_err();

        assert_eq!(rejected.error, TransportError::Busy);
        assert!(probe.rx_enabled());
        assert_eq!(probe.held_rx_buffers(), 1);
    }

    #[test]
    fn rx_buf_rsp_requires_enabled_receiver() {
        let mut link = LoopbackTransport::new();
        let rejected = link.rx_buf_rsp(RxBuffer::try_new(8).unwrap()).unwrap_err();
        assert_eq!(rejected.error, TransportError::RxNotEnabled);
    }

    #[test]
    fn held_buffers_are_released_in_order() {
        let mut link = LoopbackTransport::new();
        let probe = link.probe();

        link.rx_enable(RxBuffer::try_new(1).unwrap()).unwrap();
        link.rx_buf_rsp(RxBuffer::try_new(2).unwrap()).unwrap();

        assert_eq!(probe.held_rx_buffers(), 2);
        assert_eq!(probe.release_rx_buffer().unwrap().capacity(), 1);
        assert_eq!(probe.release_rx_buffer().unwrap().capacity(), 2);
        assert!(probe.release_rx_buffer().is_none());
    }

    #[test]
    fn take_chunks_resplits_across_transmissions() {
        let mut link = LoopbackTransport::new();
        let probe = link.probe();

        link.transmit(Bytes::from_static(b"abcde")).unwrap();
        link.transmit(Bytes::from_static(b"fgh")).unwrap();

        let chunks = probe.take_chunks(3);
        assert_eq!(
            chunks,
            vec![
                Bytes::from_static(b"abc"),
                Bytes::from_static(b"def"),
                Bytes::from_static(b"gh"),
            ]
        );
    }

    #[test]
    fn zero_chunk_size_takes_nothing() {
        let mut link = LoopbackTransport::new();
        let probe = link.probe();
        link.transmit(Bytes::from_static(b"abc")).unwrap();

        assert!(probe.take_chunks(0).is_empty());
        assert_eq!(probe.take_transmitted(), vec![Bytes::from_static(b"abc")]);
    }
}
