use std::fmt;

use bytes::Bytes;

use crate::error::LinkError;

/// Callbacks through which an endpoint observes the link.
///
/// Callbacks run on the context that drives the backend and must not block.
/// Any per-endpoint context lives in the implementing type.
pub trait EndpointHandler: Send {
    /// The endpoint was registered and can be used.
    fn bound(&mut self) {}

    /// A complete message arrived.
    fn received(&mut self, message: Bytes);

    /// Something went wrong. The backend keeps running.
    fn error(&mut self, err: &LinkError) {
        let _ = err;
    }
}

/// Opaque handle returned by [`crate::Backend::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointToken {
    _private: (),
}

impl EndpointToken {
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }
}

/// The single registered endpoint of a backend instance.
pub struct Endpoint {
    name: String,
    handler: Box<dyn EndpointHandler>,
    retained: Option<Bytes>,
}

impl Endpoint {
    pub(crate) fn new(name: String, handler: Box<dyn EndpointHandler>) -> Self {
        Self {
            name,
            handler,
            retained: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The last completed message, when the backend retains buffers.
    pub fn retained(&self) -> Option<&Bytes> {
        self.retained.as_ref()
    }

    /// Take the retained message, releasing the endpoint's hold on it.
    pub fn take_retained(&mut self) -> Option<Bytes> {
        self.retained.take()
    }

    pub(crate) fn retain(&mut self, message: Bytes) {
        self.retained = Some(message);
    }

    pub(crate) fn handler(&mut self) -> &mut dyn EndpointHandler {
        self.handler.as_mut()
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("retained", &self.retained.as_ref().map(Bytes::len))
            .finish_non_exhaustive()
    }
}
