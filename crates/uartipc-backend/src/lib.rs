//! Transfer coordination between one link and one local endpoint.
//!
//! A [`Backend`] owns a [`LinkTransport`](uartipc_transport::LinkTransport),
//! fragments outgoing messages, reassembles incoming frames, lends receive
//! buffers to the link, and reports failures to the endpoint's
//! [`EndpointHandler`]. It is driven either directly through `&mut self` or on
//! a dedicated thread via [`spawn`].

pub mod backend;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod pool;
pub mod worker;

pub use backend::{Backend, SendState};
pub use config::{BackendConfig, BufferPolicy, DEFAULT_RX_POOL_SIZE, DEFAULT_RX_TIMEOUT};
pub use endpoint::{Endpoint, EndpointHandler, EndpointToken};
pub use error::{BackendError, ErrorKind, LinkError, Result};
pub use pool::RxBufferPool;
pub use worker::{spawn, LinkHandle, DEFAULT_QUEUE_DEPTH};
