//! Event-driven byte-link transport contract.
//!
//! Models the narrow surface uartipc needs from an asynchronous serial
//! driver (UART-style DMA API):
//! - `transmit` hands off a buffer and completes later with a
//!   [`LinkEvent::TxDone`] or [`LinkEvent::TxAborted`] notification
//! - receiving runs on lent [`RxBuffer`]s: the link requests them, reports
//!   data arrival, and hands them back once drained
//! - control notifications report the receiver being disabled or stopped
//!
//! This is the lowest layer of uartipc. Device configuration stays with the
//! driver; everything above only consumes [`LinkEvent`]s.

pub mod error;
pub mod loopback;
pub mod traits;

pub use error::{BufferRejected, Result, TransportError};
pub use loopback::{LoopbackProbe, LoopbackTransport};
pub use traits::{LinkEvent, LinkTransport, RxBuffer};
