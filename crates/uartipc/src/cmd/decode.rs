use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::Instant;

use tracing::{info, warn};
use uartipc_backend::LinkError;
use uartipc_frame::{Frame, FrameError, Reassembler, FRAME_SIZE};

use crate::cmd::DecodeArgs;
use crate::exit::{io_error, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_decode, DecodeRecord, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let wire = read_input(&args.input)?;
    let (records, messages) = decode_capture(&wire);

    let errors = records
        .iter()
        .filter(|record| matches!(record, DecodeRecord::Error { .. }))
        .count();
    info!(
        wire_len = wire.len(),
        messages = messages.len(),
        errors,
        "decoded capture"
    );
    print_decode(&records, &messages, format);

    Ok(if errors == 0 { SUCCESS } else { DATA_INVALID })
}

fn read_input(path: &Path) -> CliResult<Vec<u8>> {
    if path == Path::new("-") {
        let mut wire = Vec::new();
        std::io::stdin()
            .read_to_end(&mut wire)
            .map_err(|err| io_error("failed reading stdin", err))?;
        return Ok(wire);
    }
    fs::read(path).map_err(|err| io_error(&format!("failed reading {}", path.display()), err))
}

/// Walk a capture frame by frame, reassembling whatever validates.
fn decode_capture(wire: &[u8]) -> (Vec<DecodeRecord>, Vec<Vec<u8>>) {
    let mut reassembler = Reassembler::new(None);
    let mut records = Vec::new();
    let mut messages = Vec::new();

    for (index, chunk) in wire.chunks(FRAME_SIZE).enumerate() {
        let frame = match Frame::decode(chunk) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(frame = index, error = %err, "dropping frame");
                records.push(error_record(index, err));
                continue;
            }
        };

        match reassembler.accept(chunk, Instant::now()) {
            Ok(accepted) => {
                if let Some(stale) = accepted.restarted {
                    records.push(error_record(
                        index,
                        FrameError::TransferRestarted {
                            discarded: stale.received,
                            total: stale.total,
                        },
                    ));
                }
                records.push(DecodeRecord::Fragment {
                    frame: index,
                    offset: frame.offset,
                    fragment_length: frame.fragment_length,
                    total_length: frame.total_length,
                });
                if let Some(message) = accepted.message {
                    records.push(DecodeRecord::message(index, &message));
                    messages.push(message.to_vec());
                }
            }
            Err(err) => {
                warn!(frame = index, error = %err, "dropping frame");
                records.push(error_record(index, err));
            }
        }
    }

    if let Some(unfinished) = reassembler.reset() {
        records.push(DecodeRecord::Error {
            frame: wire.len().div_ceil(FRAME_SIZE),
            kind: "protocol",
            message: format!(
                "capture ended mid-transfer ({} of {} bytes)",
                unfinished.received, unfinished.total
            ),
        });
    }

    (records, messages)
}

fn error_record(frame: usize, err: FrameError) -> DecodeRecord {
    let err = LinkError::from(err);
    DecodeRecord::Error {
        frame,
        kind: err.kind().as_str(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uartipc_frame::serialize;

    fn errors(records: &[DecodeRecord]) -> Vec<&'static str> {
        records
            .iter()
            .filter_map(|record| match record {
                DecodeRecord::Error { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn reassembles_back_to_back_messages() {
        let mut wire = serialize(&[1u8; 100]).unwrap().to_vec();
        wire.extend_from_slice(&serialize(b"second").unwrap());

        let (records, messages) = decode_capture(&wire);
        assert_eq!(messages, vec![vec![1u8; 100], b"second".to_vec()]);
        assert!(errors(&records).is_empty());
    }

    #[test]
    fn corrupt_frame_is_reported_and_rest_continues() {
        let mut wire = serialize(&[2u8; 100]).unwrap().to_vec();
        wire[FRAME_SIZE + 8] ^= 0x80;
        wire.extend_from_slice(&serialize(b"next").unwrap());

        let (records, messages) = decode_capture(&wire);
        assert_eq!(messages, vec![b"next".to_vec()]);
        assert_eq!(errors(&records), vec!["integrity", "protocol"]);
    }

    #[test]
    fn truncated_capture_reports_short_frame() {
        let wire = serialize(&[3u8; 100]).unwrap();
        let (records, messages) = decode_capture(&wire[..wire.len() - 1]);

        assert!(messages.is_empty());
        assert_eq!(errors(&records), vec!["protocol", "protocol"]);
    }
}
