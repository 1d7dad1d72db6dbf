//! Run a [`Backend`] on its own thread behind a bounded queue.
//!
//! Link notifications are posted with [`LinkHandle::notify`], which never
//! blocks and is safe to call from a driver callback. The worker drains the
//! queue one request at a time and wakes on the reassembly deadline to expire
//! stalled transfers, so the backend only ever runs on one context.

use std::sync::mpsc::{self, RecvTimeoutError, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, trace};
use uartipc_transport::{LinkEvent, LinkTransport};

use crate::backend::Backend;
use crate::endpoint::EndpointToken;
use crate::error::{BackendError, Result};

/// Default number of queued requests before `notify` reports `QueueFull`.
pub const DEFAULT_QUEUE_DEPTH: usize = 32;

enum Request {
    Event(LinkEvent),
    Send {
        data: Bytes,
        reply: SyncSender<Result<()>>,
    },
    Shutdown,
}

/// Cloneable handle for feeding a running worker.
#[derive(Clone)]
pub struct LinkHandle {
    tx: SyncSender<Request>,
    token: EndpointToken,
}

impl LinkHandle {
    /// Post a link notification without blocking.
    pub fn notify(&self, event: LinkEvent) -> Result<()> {
        self.tx.try_send(Request::Event(event)).map_err(|err| match err {
            TrySendError::Full(_) => BackendError::QueueFull,
            TrySendError::Disconnected(_) => BackendError::WorkerStopped,
        })
    }

    /// Send a message through the worker and wait for the link to accept it.
    pub fn send(&self, data: impl Into<Bytes>) -> Result<()> {
        let (reply, response) = mpsc::sync_channel(1);
        self.tx
            .send(Request::Send {
                data: data.into(),
                reply,
            })
            .map_err(|_| BackendError::WorkerStopped)?;
        response.recv().map_err(|_| BackendError::WorkerStopped)?
    }

    /// Ask the worker to exit after the requests already queued.
    pub fn shutdown(&self) -> Result<()> {
        self.tx
            .send(Request::Shutdown)
            .map_err(|_| BackendError::WorkerStopped)
    }
}

impl std::fmt::Debug for LinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkHandle").finish_non_exhaustive()
    }
}

/// Move `backend` onto a worker thread.
///
/// The join handle yields the backend back once the worker stops, either on
/// [`LinkHandle::shutdown`] or when every handle has been dropped.
pub fn spawn<T>(
    backend: Backend<T>,
    token: EndpointToken,
    queue_depth: usize,
) -> Result<(LinkHandle, JoinHandle<Backend<T>>)>
where
    T: LinkTransport + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(queue_depth);
    let join = thread::Builder::new()
        .name("uartipc-worker".to_string())
        .spawn(move || run(backend, token, rx))
        .map_err(BackendError::Spawn)?;
    Ok((LinkHandle { tx, token }, join))
}

fn run<T: LinkTransport>(
    mut backend: Backend<T>,
    token: EndpointToken,
    rx: mpsc::Receiver<Request>,
) -> Backend<T> {
    debug!("worker started");
    loop {
        let request = match backend.next_deadline() {
            Some(deadline) => {
                let wait = deadline.saturating_duration_since(Instant::now());
                match rx.recv_timeout(wait) {
                    Ok(request) => request,
                    Err(RecvTimeoutError::Timeout) => {
                        backend.poll_timeout(Instant::now());
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(request) => request,
                Err(_) => break,
            },
        };

        match request {
            Request::Event(event) => backend.handle_event(event),
            Request::Send { data, reply } => {
                let _ = reply.send(backend.send(token, &data));
            }
            Request::Shutdown => break,
        }
        trace!("request handled");
        backend.poll_timeout(Instant::now());
    }
    debug!("worker stopped");
    backend
}
