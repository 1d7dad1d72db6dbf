use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, error, warn};
use uartipc_frame::{serialize, FrameError, ReassemblyState, Reassembler, FRAME_SIZE};
use uartipc_transport::{LinkEvent, LinkTransport, TransportError};

use crate::config::{BackendConfig, BufferPolicy};
use crate::endpoint::{Endpoint, EndpointHandler, EndpointToken};
use crate::error::{BackendError, LinkError, Result};
use crate::pool::RxBufferPool;

/// Progress of the single outgoing transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    /// No transmission in flight.
    Ready,
    /// The link owns a transmission and has not reported completion.
    Sending,
}

/// IPC service backend for one link and one endpoint.
///
/// All notification handling happens through `&mut self`, so the
/// reassembly buffer is never touched by two contexts at once: whoever owns
/// the backend serializes link events, sends, and timeout polls.
pub struct Backend<T> {
    transport: T,
    config: BackendConfig,
    endpoint: Option<Endpoint>,
    opened: bool,
    pool: Option<RxBufferPool>,
    reassembler: Reassembler,
    send_state: SendState,
    tx_buffer: Option<Bytes>,
}

impl<T: LinkTransport> Backend<T> {
    /// Create a backend over `transport`. Nothing touches the link until
    /// [`Backend::open`].
    pub fn new(transport: T, config: BackendConfig) -> Self {
        let reassembler = Reassembler::new(config.rx_timeout);
        Self {
            transport,
            config,
            endpoint: None,
            opened: false,
            pool: None,
            reassembler,
            send_state: SendState::Ready,
            tx_buffer: None,
        }
    }

    /// Register the instance's endpoint.
    ///
    /// The handler's `bound` callback runs before this returns.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: impl EndpointHandler + 'static,
    ) -> Result<EndpointToken> {
        if let Some(endpoint) = &self.endpoint {
            error!(name = endpoint.name(), "endpoint already registered");
            return Err(BackendError::AlreadyRegistered(endpoint.name().to_string()));
        }

        let endpoint = self
            .endpoint
            .insert(Endpoint::new(name.into(), Box::new(handler)));
        debug!(name = endpoint.name(), "endpoint registered");
        endpoint.handler().bound();
        Ok(EndpointToken::new())
    }

    /// Allocate receive buffers and enable the link's receiver.
    pub fn open(&mut self) -> Result<()> {
        if self.opened {
            return Err(BackendError::AlreadyOpen);
        }
        if !self.transport.is_ready() {
            error!("link device is not ready");
            return Err(BackendError::DeviceNotReady);
        }

        let mut pool = RxBufferPool::new(self.config.rx_pool_size, FRAME_SIZE)?;
        let initial = pool.acquire().ok_or(BackendError::OutOfMemory)?;

        if let Err(rejected) = self.transport.rx_enable(initial) {
            error!(error = %rejected.error, "failed to enable receiver");
            return Err(match rejected.error {
                TransportError::Busy => BackendError::AlreadyOpen,
                TransportError::NotReady => BackendError::DeviceNotReady,
                other => BackendError::Transport(other),
            });
        }
        debug!(block_size = pool.block_size(), "receiver enabled");

        self.pool = Some(pool);
        self.opened = true;
        self.send_state = SendState::Ready;
        Ok(())
    }

    /// Fragment `data` and hand it to the link.
    ///
    /// Returns once the link accepted the frames; completion is reported
    /// later through [`LinkEvent::TxDone`] or [`LinkEvent::TxAborted`].
    pub fn send(&mut self, _token: EndpointToken, data: &[u8]) -> Result<()> {
        if self.endpoint.is_none() {
            return Err(BackendError::NotRegistered);
        }
        if self.send_state == SendState::Sending {
            return Err(BackendError::Busy);
        }

        let wire = match serialize(data) {
            Ok(wire) => wire,
            Err(FrameError::OutOfMemory { size }) => {
                error!(size, "failed to allocate frames");
                self.report(LinkError::OutOfMemory);
                return Err(BackendError::OutOfMemory);
            }
            Err(err) => {
                self.report(LinkError::Frame(err.clone()));
                return Err(BackendError::Frame(err));
            }
        };

        if let Err(err) = self.transport.transmit(wire.clone()) {
            error!(error = %err, "link transmit failed");
            self.report(LinkError::Transport(err.clone()));
            return Err(BackendError::Transport(err));
        }

        debug!(len = data.len(), wire_len = wire.len(), "transmission started");
        self.tx_buffer = Some(wire);
        self.send_state = SendState::Sending;
        Ok(())
    }

    /// Handle a link notification as it arrives.
    pub fn handle_event(&mut self, event: LinkEvent) {
        self.handle_event_at(event, Instant::now());
    }

    /// Handle a link notification observed at `now`.
    pub fn handle_event_at(&mut self, event: LinkEvent, now: Instant) {
        debug!(event = event.name(), "link event");
        match event {
            LinkEvent::TxDone { len } => {
                debug!(len, "transmission complete");
                self.release_tx();
            }
            LinkEvent::TxAborted { len } => {
                self.report(LinkError::TxAborted { len });
                self.release_tx();
            }
            LinkEvent::RxReady { data } => self.receive(&data, now),
            LinkEvent::RxBufRequest => self.provide_rx_buffer(),
            LinkEvent::RxBufReleased { buffer } => match &mut self.pool {
                Some(pool) => pool.release(buffer),
                None => warn!("receive buffer released before open"),
            },
            LinkEvent::RxDisabled => self.report(LinkError::RxDisabled),
            LinkEvent::RxStopped => self.report(LinkError::RxStopped),
        }
    }

    /// Expire a stalled transfer if its deadline has passed at `now`.
    ///
    /// Returns whether a transfer was dropped.
    pub fn poll_timeout(&mut self, now: Instant) -> bool {
        let Some(expired) = self.reassembler.expire(now) else {
            return false;
        };
        self.report(LinkError::Timeout {
            received: expired.received,
            total: expired.total,
            idle: self.config.rx_timeout.unwrap_or_default(),
        });
        true
    }

    /// When [`Backend::poll_timeout`] next needs to run.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.reassembler.deadline()
    }

    pub fn send_state(&self) -> SendState {
        self.send_state
    }

    pub fn reassembly_state(&self) -> ReassemblyState {
        self.reassembler.state()
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn endpoint_mut(&mut self) -> Option<&mut Endpoint> {
        self.endpoint.as_mut()
    }

    /// Receive buffers not currently lent to the link.
    pub fn free_rx_buffers(&self) -> usize {
        self.pool.as_ref().map_or(0, RxBufferPool::available)
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn release_tx(&mut self) {
        if self.tx_buffer.take().is_none() {
            warn!("transmission completion without a pending send");
        }
        self.send_state = SendState::Ready;
    }

    fn receive(&mut self, data: &[u8], now: Instant) {
        // A frame that arrives after the window closed must not extend it.
        self.poll_timeout(now);
        if data.len() != FRAME_SIZE {
            error!(len = data.len(), "received data is not a valid frame");
            self.report(LinkError::Frame(FrameError::InvalidFrameSize {
                len: data.len(),
                expected: FRAME_SIZE,
            }));
            return;
        }
        if self.endpoint.is_none() {
            warn!("received data but no endpoint registered");
            return;
        }

        match self.reassembler.accept(data, now) {
            Ok(accepted) => {
                if let Some(stale) = accepted.restarted {
                    self.report(LinkError::Frame(FrameError::TransferRestarted {
                        discarded: stale.received,
                        total: stale.total,
                    }));
                }
                if let Some(message) = accepted.message {
                    self.deliver(message);
                }
            }
            Err(err) => {
                warn!(error = %err, "dropping frame");
                self.report(LinkError::Frame(err));
            }
        }
    }

    fn deliver(&mut self, message: Bytes) {
        let policy = self.config.buffer_policy;
        let Some(endpoint) = self.endpoint.as_mut() else {
            return;
        };
        debug!(len = message.len(), "message complete");
        if policy == BufferPolicy::Retain {
            endpoint.retain(message.clone());
        }
        endpoint.handler().received(message);
    }

    fn provide_rx_buffer(&mut self) {
        let Some(buffer) = self.pool.as_mut().and_then(RxBufferPool::acquire) else {
            error!("no receive buffer available");
            self.report(LinkError::RxBufferExhausted);
            return;
        };
        if let Err(rejected) = self.transport.rx_buf_rsp(buffer) {
            error!(error = %rejected.error, "failed to respond to receive buffer request");
            if let Some(pool) = &mut self.pool {
                pool.release(rejected.buffer);
            }
            self.report(LinkError::Transport(rejected.error));
        }
    }

    fn report(&mut self, err: LinkError) {
        match self.endpoint.as_mut() {
            Some(endpoint) => endpoint.handler().error(&err),
            None => warn!(error = %err, "link error with no endpoint registered"),
        }
    }
}

impl<T> std::fmt::Debug for Backend<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("endpoint", &self.endpoint)
            .field("opened", &self.opened)
            .field("send_state", &self.send_state)
            .field("reassembler", &self.reassembler)
            .finish_non_exhaustive()
    }
}
