use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use uartipc_frame::Frame;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One encoded frame, as printed by `encode`.
#[derive(Debug, Serialize)]
pub struct FrameRecord {
    pub index: usize,
    pub total_length: u16,
    pub offset: u16,
    pub fragment_length: u8,
    pub checksum: String,
    pub payload: String,
}

impl FrameRecord {
    pub fn new(index: usize, frame: &Frame) -> Self {
        Self {
            index,
            total_length: frame.total_length,
            offset: frame.offset,
            fragment_length: frame.fragment_length,
            checksum: format!("{:#010x}", frame.checksum()),
            payload: payload_preview(frame.fragment()),
        }
    }
}

/// What happened to one chunk of a decoded capture.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DecodeRecord {
    Fragment {
        frame: usize,
        offset: u16,
        fragment_length: u8,
        total_length: u16,
    },
    Message {
        frame: usize,
        size: usize,
        payload: String,
    },
    Error {
        frame: usize,
        kind: &'static str,
        message: String,
    },
}

impl DecodeRecord {
    pub fn message(frame: usize, data: &[u8]) -> Self {
        DecodeRecord::Message {
            frame,
            size: data.len(),
            payload: payload_preview(data),
        }
    }

    fn row(&self) -> Vec<String> {
        match self {
            DecodeRecord::Fragment {
                frame,
                offset,
                fragment_length,
                total_length,
            } => vec![
                frame.to_string(),
                "fragment".to_string(),
                format!("offset={offset} len={fragment_length} total={total_length}"),
            ],
            DecodeRecord::Message {
                frame,
                size,
                payload,
            } => vec![
                frame.to_string(),
                "message".to_string(),
                format!("size={size} payload={payload}"),
            ],
            DecodeRecord::Error {
                frame,
                kind,
                message,
            } => vec![frame.to_string(), format!("error ({kind})"), message.clone()],
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorRecord {
    pub kind: &'static str,
    pub message: String,
}

/// Result of a `loopback` run.
#[derive(Debug, Serialize)]
pub struct LoopbackReport {
    pub message_size: usize,
    pub frames_sent: usize,
    pub frames_delivered: usize,
    pub delivered: bool,
    pub intact: bool,
    pub errors: Vec<ErrorRecord>,
}

pub fn print_frames(records: &[FrameRecord], wire: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for record in records {
                print_json(record);
            }
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["FRAME", "OFFSET", "LEN", "TOTAL", "CRC", "PAYLOAD"]);
            for record in records {
                table.add_row(vec![
                    record.index.to_string(),
                    record.offset.to_string(),
                    record.fragment_length.to_string(),
                    record.total_length.to_string(),
                    record.checksum.clone(),
                    record.payload.clone(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for record in records {
                println!(
                    "frame={} offset={} len={} total={} crc={} payload={}",
                    record.index,
                    record.offset,
                    record.fragment_length,
                    record.total_length,
                    record.checksum,
                    record.payload
                );
            }
        }
        OutputFormat::Raw => print_raw(wire),
    }
}

pub fn print_decode(records: &[DecodeRecord], messages: &[Vec<u8>], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for record in records {
                print_json(record);
            }
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["FRAME", "EVENT", "DETAIL"]);
            for record in records {
                table.add_row(record.row());
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for record in records {
                println!("{}", record.row().join(" "));
            }
        }
        OutputFormat::Raw => {
            for message in messages {
                print_raw(message);
            }
        }
    }
}

pub fn print_loopback(report: &LoopbackReport, received: Option<&[u8]>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut table = new_table(vec!["SIZE", "SENT", "DELIVERED", "INTACT", "ERRORS"]);
            table.add_row(vec![
                report.message_size.to_string(),
                report.frames_sent.to_string(),
                report.frames_delivered.to_string(),
                report.intact.to_string(),
                report.errors.len().to_string(),
            ]);
            println!("{table}");
            for err in &report.errors {
                println!("{}: {}", err.kind, err.message);
            }
        }
        OutputFormat::Pretty => {
            println!(
                "size={} sent={} delivered={} intact={}",
                report.message_size, report.frames_sent, report.frames_delivered, report.intact
            );
            for err in &report.errors {
                println!("error kind={} {}", err.kind, err.message);
            }
        }
        OutputFormat::Raw => {
            if let Some(data) = received {
                print_raw(data);
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_record_shows_checksum_as_hex() {
        let frame = Frame::new(2, 0, b"hi").unwrap();
        let record = FrameRecord::new(0, &frame);
        assert!(record.checksum.starts_with("0x"));
        assert_eq!(record.checksum.len(), 10);
        assert_eq!(record.payload, "hi");
    }

    #[test]
    fn decode_records_are_tagged() {
        let record = DecodeRecord::Error {
            frame: 3,
            kind: "integrity",
            message: "checksum mismatch".to_string(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["event"], "error");
        assert_eq!(json["frame"], 3);
        assert_eq!(json["kind"], "integrity");
    }

    #[test]
    fn binary_payloads_are_summarized() {
        assert_eq!(payload_preview(&[0xff, 0xfe]), "<binary 2 bytes>");
    }
}
