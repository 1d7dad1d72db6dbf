use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::codec::Frame;
use crate::error::{FrameError, Result};

/// Observable state of a [`Reassembler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassemblyState {
    /// No transfer in progress.
    Idle,
    /// A transfer has started and is missing bytes.
    Accumulating { received: usize, total: usize },
}

/// Outcome of an accepted fragment.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Accepted {
    /// The assembled message, if this fragment completed the transfer.
    pub message: Option<Bytes>,
    /// A stale transfer discarded because this fragment restarted the stream.
    pub restarted: Option<Expired>,
}

/// A partial transfer that was dropped before completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expired {
    /// Bytes received before the transfer was dropped.
    pub received: usize,
    /// Length the transfer announced.
    pub total: usize,
}

struct PartialTransfer {
    buffer: Vec<u8>,
    received: usize,
    deadline: Option<Instant>,
}

impl PartialTransfer {
    fn expired(&self) -> Expired {
        Expired {
            received: self.received,
            total: self.buffer.len(),
        }
    }
}

/// Receive-side state machine that rebuilds messages from frames.
///
/// Holds at most one partial transfer. Fragments must arrive in order: the
/// next accepted fragment is the one whose offset equals the bytes received
/// so far. Anything else is rejected without disturbing the transfer.
pub struct Reassembler {
    partial: Option<PartialTransfer>,
    rx_timeout: Option<Duration>,
    lapsed: Option<Lapsed>,
}

/// A transfer found past its deadline by [`Reassembler::accept`], held until
/// the next [`Reassembler::expire`] reports it.
struct Lapsed {
    deadline: Instant,
    expired: Expired,
}

impl Reassembler {
    /// Create an idle reassembler.
    ///
    /// `rx_timeout` is the inactivity window between accepted fragments;
    /// `None` waits forever.
    pub fn new(rx_timeout: Option<Duration>) -> Self {
        Self {
            partial: None,
            rx_timeout,
            lapsed: None,
        }
    }

    pub fn state(&self) -> ReassemblyState {
        match &self.partial {
            None => ReassemblyState::Idle,
            Some(partial) => ReassemblyState::Accumulating {
                received: partial.received,
                total: partial.buffer.len(),
            },
        }
    }

    /// When the active transfer expires, if it can.
    pub fn deadline(&self) -> Option<Instant> {
        match &self.lapsed {
            Some(lapsed) => Some(lapsed.deadline),
            None => self.partial.as_ref().and_then(|partial| partial.deadline),
        }
    }

    pub fn rx_timeout(&self) -> Option<Duration> {
        self.rx_timeout
    }

    /// Feed one wire frame received at `now`.
    ///
    /// Rejected frames leave the transfer untouched, including the deadline.
    /// A transfer whose deadline had already passed at `now` is never
    /// extended: it is dropped before the frame is looked at and handed out
    /// by the next [`Reassembler::expire`].
    pub fn accept(&mut self, wire: &[u8], now: Instant) -> Result<Accepted> {
        let frame = Frame::decode(wire)?;
        self.lapse(now);
        let mut accepted = Accepted::default();

        // A start fragment only displaces the active transfer once its own
        // buffer is in place.
        let mut partial = if frame.is_first() {
            start_transfer(frame.total_length as usize)?
        } else {
            self.check_continuation(&frame)?;
            self.partial
                .take()
                .ok_or(FrameError::UnexpectedFragment {
                    offset: frame.offset as usize,
                })?
        };

        match frame.copy_into(&mut partial.buffer) {
            Ok(copied) => partial.received += copied,
            Err(err) => {
                if !frame.is_first() {
                    self.partial = Some(partial);
                }
                return Err(err);
            }
        }
        debug!(
            offset = frame.offset,
            len = frame.fragment_length,
            received = partial.received,
            total = partial.buffer.len(),
            "accepted fragment"
        );

        if frame.is_first() {
            if let Some(stale) = self.partial.take().map(|partial| partial.expired()) {
                warn!(
                    received = stale.received,
                    total = stale.total,
                    "start fragment replaced unfinished transfer"
                );
                accepted.restarted = Some(stale);
            }
        }

        if partial.received == partial.buffer.len() {
            accepted.message = Some(Bytes::from(partial.buffer));
        } else {
            partial.deadline = self.rx_timeout.map(|timeout| now + timeout);
            self.partial = Some(partial);
        }
        Ok(accepted)
    }

    /// Drop the active transfer if its deadline has passed at `now`.
    pub fn expire(&mut self, now: Instant) -> Option<Expired> {
        self.lapse(now);
        let expired = self.lapsed.take()?.expired;
        warn!(
            received = expired.received,
            total = expired.total,
            "transfer timed out waiting for next frame"
        );
        Some(expired)
    }

    /// Drop the active transfer unconditionally.
    pub fn reset(&mut self) -> Option<Expired> {
        let lapsed = self.lapsed.take().map(|lapsed| lapsed.expired);
        self.partial
            .take()
            .map(|partial| partial.expired())
            .or(lapsed)
    }

    fn lapse(&mut self, now: Instant) {
        let due = self
            .partial
            .as_ref()
            .and_then(|partial| partial.deadline)
            .filter(|deadline| now >= *deadline);
        let Some(deadline) = due else {
            return;
        };
        if let Some(partial) = self.partial.take() {
            self.lapsed = Some(Lapsed {
                deadline,
                expired: partial.expired(),
            });
        }
    }

    fn check_continuation(&self, frame: &Frame) -> Result<()> {
        let Some(partial) = &self.partial else {
            return Err(FrameError::UnexpectedFragment {
                offset: frame.offset as usize,
            });
        };
        if frame.total_length as usize != partial.buffer.len() {
            return Err(FrameError::LengthMismatch {
                expected: partial.buffer.len(),
                actual: frame.total_length as usize,
            });
        }
        if frame.offset as usize != partial.received {
            return Err(FrameError::OutOfSequence {
                expected: partial.received,
                offset: frame.offset as usize,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for Reassembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reassembler")
            .field("state", &self.state())
            .field("rx_timeout", &self.rx_timeout)
            .finish()
    }
}

fn start_transfer(total: usize) -> Result<PartialTransfer> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(total)
        .map_err(|_| FrameError::OutOfMemory { size: total })?;
    buffer.resize(total, 0);
    Ok(PartialTransfer {
        buffer,
        received: 0,
        deadline: None,
    })
}
