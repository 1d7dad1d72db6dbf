use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{info, warn};
use uartipc_backend::{
    spawn, Backend, BackendConfig, EndpointHandler, EndpointToken, ErrorKind, LinkError,
    DEFAULT_QUEUE_DEPTH,
};
use uartipc_frame::{FRAME_SIZE, HEADER_SIZE};
use uartipc_transport::{LinkEvent, LoopbackTransport};

use crate::cmd::{parse_duration, parse_optional_duration, LoopbackArgs};
use crate::exit::{backend_error, CliError, CliResult, DATA_INVALID, INTERNAL, SUCCESS, TIMEOUT};
use crate::output::{print_loopback, ErrorRecord, LoopbackReport, OutputFormat};

pub fn run(args: LoopbackArgs, format: OutputFormat) -> CliResult<i32> {
    let message = args.payload.resolve()?;
    let config = BackendConfig {
        rx_timeout: parse_optional_duration(&args.rx_timeout)?,
        ..BackendConfig::default()
    };
    let plan = Faults {
        corrupt: args.corrupt,
        drop: args.drop,
    };
    let wait = parse_duration(&args.wait)?;

    let exchange = exchange(&message, config, plan, wait)?;
    let intact = exchange.received.as_deref() == Some(message.as_slice());
    let report = LoopbackReport {
        message_size: message.len(),
        frames_sent: exchange.frames_sent,
        frames_delivered: exchange.frames_delivered,
        delivered: exchange.received.is_some(),
        intact,
        errors: exchange
            .errors
            .iter()
            .map(|err| ErrorRecord {
                kind: err.kind().as_str(),
                message: err.to_string(),
            })
            .collect(),
    };
    info!(
        delivered = report.delivered,
        intact,
        errors = report.errors.len(),
        "loopback finished"
    );
    print_loopback(&report, exchange.received.as_deref(), format);

    if intact {
        return Ok(SUCCESS);
    }
    let timed_out = exchange.received.is_none()
        && (exchange.errors.is_empty()
            || exchange
                .errors
                .iter()
                .any(|err| err.kind() == ErrorKind::Timeout));
    Ok(if timed_out { TIMEOUT } else { DATA_INVALID })
}

#[derive(Debug, Clone, Copy, Default)]
struct Faults {
    corrupt: Option<usize>,
    drop: Option<usize>,
}

#[derive(Debug)]
struct Exchange {
    frames_sent: usize,
    frames_delivered: usize,
    received: Option<Bytes>,
    errors: Vec<LinkError>,
}

enum Outcome {
    Message(Bytes),
    Error(LinkError),
}

struct Reporter(Sender<Outcome>);

impl EndpointHandler for Reporter {
    fn received(&mut self, message: Bytes) {
        let _ = self.0.send(Outcome::Message(message));
    }

    fn error(&mut self, err: &LinkError) {
        let _ = self.0.send(Outcome::Error(err.clone()));
    }
}

type Opened = (Backend<LoopbackTransport>, EndpointToken, Receiver<Outcome>);

fn open_backend(name: &str, config: BackendConfig) -> CliResult<Opened> {
    let mut backend = Backend::new(LoopbackTransport::new(), config);
    let (tx, rx) = mpsc::channel();
    let token = backend
        .register(name, Reporter(tx))
        .map_err(|err| backend_error("register failed", err))?;
    backend
        .open()
        .map_err(|err| backend_error("open failed", err))?;
    Ok((backend, token, rx))
}

/// Push `message` from one backend to another, applying `faults` to the
/// frames in between.
fn exchange(
    message: &[u8],
    config: BackendConfig,
    faults: Faults,
    wait: Duration,
) -> CliResult<Exchange> {
    let (mut sender, sender_token, sender_outcomes) = open_backend("sender", config.clone())?;
    let (receiver, receiver_token, outcomes) = open_backend("receiver", config)?;
    let wire = sender.transport().probe();

    sender
        .send(sender_token, message)
        .map_err(|err| backend_error("send failed", err))?;
    let chunks = wire.take_chunks(FRAME_SIZE);
    let frames_sent = chunks.len();
    for (flag, index) in [("--corrupt", faults.corrupt), ("--drop", faults.drop)] {
        if let Some(index) = index.filter(|&index| index >= frames_sent) {
            warn!(frame = index, frames = frames_sent, "{flag} is past the last frame");
        }
    }

    let (handle, worker) = spawn(receiver, receiver_token, frames_sent + DEFAULT_QUEUE_DEPTH)
        .map_err(|err| backend_error("failed to start receiver", err))?;

    let mut frames_delivered = 0;
    for (index, chunk) in chunks.into_iter().enumerate() {
        if faults.drop == Some(index) {
            info!(frame = index, "dropping frame");
            continue;
        }
        let data = if faults.corrupt == Some(index) {
            info!(frame = index, "corrupting frame");
            flip_bit(&chunk)
        } else {
            chunk
        };
        handle
            .notify(LinkEvent::RxReady { data })
            .map_err(|err| backend_error("delivery failed", err))?;
        frames_delivered += 1;
    }
    sender.handle_event(LinkEvent::TxDone {
        len: frames_sent * FRAME_SIZE,
    });

    let (received, mut errors) = collect(&outcomes, wait);

    handle
        .shutdown()
        .map_err(|err| backend_error("failed to stop receiver", err))?;
    worker
        .join()
        .map_err(|_| CliError::new(INTERNAL, "receiver worker panicked"))?;

    errors.extend(sender_outcomes.try_iter().filter_map(|outcome| match outcome {
        Outcome::Error(err) => Some(err),
        Outcome::Message(_) => None,
    }));

    Ok(Exchange {
        frames_sent,
        frames_delivered,
        received,
        errors,
    })
}

/// Gather receiver reports until a message arrives, the transfer times out,
/// or `wait` elapses.
fn collect(outcomes: &Receiver<Outcome>, wait: Duration) -> (Option<Bytes>, Vec<LinkError>) {
    let deadline = Instant::now() + wait;
    let mut errors = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match outcomes.recv_timeout(remaining) {
            Ok(Outcome::Message(message)) => return (Some(message), errors),
            Ok(Outcome::Error(err)) => {
                let timed_out = err.kind() == ErrorKind::Timeout;
                errors.push(err);
                if timed_out {
                    return (None, errors);
                }
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                return (None, errors)
            }
        }
    }
}

fn flip_bit(frame: &[u8]) -> Bytes {
    let mut data = frame.to_vec();
    if let Some(byte) = data.get_mut(HEADER_SIZE) {
        *byte ^= 0x01;
    }
    Bytes::from(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rx_timeout: Option<Duration>) -> BackendConfig {
        BackendConfig {
            rx_timeout,
            ..BackendConfig::default()
        }
    }

    fn kinds(exchange: &Exchange) -> Vec<ErrorKind> {
        exchange.errors.iter().map(LinkError::kind).collect()
    }

    #[test]
    fn clean_link_delivers_message() {
        let message: Vec<u8> = (0..500).map(|i| i as u8).collect();
        let exchange = exchange(
            &message,
            config(Some(Duration::from_millis(100))),
            Faults::default(),
            Duration::from_secs(2),
        )
        .unwrap();

        assert_eq!(exchange.frames_sent, 8);
        assert_eq!(exchange.frames_delivered, 8);
        assert_eq!(exchange.received.as_deref(), Some(message.as_slice()));
        assert!(exchange.errors.is_empty());
    }

    #[test]
    fn corrupted_frame_stalls_then_times_out() {
        let exchange = exchange(
            &[0x42; 150],
            config(Some(Duration::from_millis(200))),
            Faults {
                corrupt: Some(1),
                drop: None,
            },
            Duration::from_secs(2),
        )
        .unwrap();

        assert!(exchange.received.is_none());
        assert_eq!(
            kinds(&exchange),
            vec![ErrorKind::Integrity, ErrorKind::Protocol, ErrorKind::Timeout]
        );
    }

    #[test]
    fn dropped_frame_without_timeout_waits_it_out() {
        let exchange = exchange(
            &[0x17; 150],
            config(None),
            Faults {
                corrupt: None,
                drop: Some(1),
            },
            Duration::from_millis(100),
        )
        .unwrap();

        assert_eq!(exchange.frames_delivered, 2);
        assert!(exchange.received.is_none());
        assert_eq!(kinds(&exchange), vec![ErrorKind::Protocol]);
    }

    #[test]
    fn empty_message_crosses_as_one_frame() {
        let exchange = exchange(
            &[],
            config(Some(Duration::from_millis(100))),
            Faults::default(),
            Duration::from_secs(2),
        )
        .unwrap();

        assert_eq!(exchange.frames_sent, 1);
        assert_eq!(exchange.received.as_deref(), Some(&[][..]));
    }

    #[test]
    fn flip_bit_touches_payload() {
        let frame = [0u8; FRAME_SIZE];
        let flipped = flip_bit(&frame);
        assert_eq!(flipped[HEADER_SIZE], 0x01);
        assert_eq!(flipped.len(), FRAME_SIZE);
    }
}
