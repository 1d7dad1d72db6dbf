//! Two backends joined by in-memory links, one driven on a worker thread.
//!
//! Run with:
//!   cargo run --example loopback

use std::sync::mpsc;
use std::time::Duration;

use bytes::Bytes;
use uartipc::backend::{spawn, Backend, BackendConfig, EndpointHandler, LinkError};
use uartipc::frame::FRAME_SIZE;
use uartipc::transport::{LinkEvent, LoopbackTransport};

struct Printer(mpsc::Sender<Bytes>);

impl EndpointHandler for Printer {
    fn bound(&mut self) {
        eprintln!("receiver endpoint bound");
    }

    fn received(&mut self, message: Bytes) {
        let _ = self.0.send(message);
    }

    fn error(&mut self, err: &LinkError) {
        eprintln!("receiver error ({}): {err}", err.kind());
    }
}

struct Quiet;

impl EndpointHandler for Quiet {
    fn received(&mut self, _message: Bytes) {}
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let link = LoopbackTransport::new();
    let wire = link.probe();
    let mut sender = Backend::new(link, BackendConfig::default());
    let sender_token = sender.register("sender", Quiet)?;
    sender.open()?;

    let (tx, rx) = mpsc::channel();
    let mut receiver = Backend::new(LoopbackTransport::new(), BackendConfig::default());
    let receiver_token = receiver.register("receiver", Printer(tx))?;
    receiver.open()?;
    let (handle, worker) = spawn(receiver, receiver_token, 64)?;

    let message = "a message long enough to need several frames on the wire ".repeat(4);
    sender.send(sender_token, message.as_bytes())?;

    let frames = wire.take_chunks(FRAME_SIZE);
    let wire_len = frames.len() * FRAME_SIZE;
    eprintln!("{} bytes -> {} frames", message.len(), frames.len());
    for data in frames {
        handle.notify(LinkEvent::RxReady { data })?;
    }
    sender.handle_event(LinkEvent::TxDone { len: wire_len });

    let received = rx.recv_timeout(Duration::from_secs(1))?;
    eprintln!(
        "received {} bytes, intact: {}",
        received.len(),
        received == message.as_bytes()
    );

    handle.shutdown()?;
    let _ = worker.join();
    Ok(())
}
