use clap::{Args, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod loopback;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fragment a message into wire frames.
    Encode(EncodeArgs),
    /// Validate and reassemble frames from a wire capture.
    Decode(DecodeArgs),
    /// Send a message between two in-memory backends.
    Loopback(LoopbackArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Loopback(args) => loopback::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Message input shared by commands that send something.
#[derive(Args, Debug, Default)]
pub struct PayloadArgs {
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["file", "hex"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
    /// Hex-encoded payload (e.g. 48656c6c6f).
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
}

impl PayloadArgs {
    pub fn resolve(&self) -> CliResult<Vec<u8>> {
        if let Some(data) = &self.data {
            return Ok(data.as_bytes().to_vec());
        }
        if let Some(path) = &self.file {
            return fs::read(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
        }
        if let Some(hex) = &self.hex {
            return parse_hex(hex);
        }
        Ok(Vec::new())
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    #[command(flatten)]
    pub payload: PayloadArgs,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Wire capture to read, or `-` for stdin.
    #[arg(default_value = "-")]
    pub input: PathBuf,
}

#[derive(Args, Debug)]
pub struct LoopbackArgs {
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Inactivity window between frames of one message (e.g. 100ms, 2s; 0 waits forever).
    #[arg(long, env = "UARTIPC_RX_TIMEOUT", default_value = "100ms")]
    pub rx_timeout: String,
    /// Flip one bit in frame N (0-based) before delivery.
    #[arg(long, value_name = "N")]
    pub corrupt: Option<usize>,
    /// Drop frame N (0-based) instead of delivering it.
    #[arg(long, value_name = "N")]
    pub drop: Option<usize>,
    /// How long to wait for the receiver to report (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s")]
    pub wait: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse a duration such as `2s`, `150ms`, or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    match parse_optional_duration(input)? {
        Some(duration) => Ok(duration),
        None => Err(CliError::new(USAGE, "duration must be greater than zero")),
    }
}

/// Like [`parse_duration`], but zero means "no limit".
pub fn parse_optional_duration(input: &str) -> CliResult<Option<Duration>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Ok(None);
    }

    match unit {
        "ms" => Ok(Some(Duration::from_millis(value))),
        "s" => Ok(Some(Duration::from_secs(value))),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}

fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::new(USAGE, "--hex needs an even number of digits"));
    }
    digits
        .chunks(2)
        .map(|pair| match (hex_digit(pair[0]), hex_digit(pair[1])) {
            (Some(high), Some(low)) => Ok((high << 4) | low),
            _ => Err(CliError::new(
                USAGE,
                format!("--hex has invalid digits: {}", String::from_utf8_lossy(pair)),
            )),
        })
        .collect()
}

fn hex_digit(digit: u8) -> Option<u8> {
    (digit as char).to_digit(16).map(|value| value as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn zero_timeout_means_forever() {
        assert_eq!(parse_optional_duration("0").unwrap(), None);
        assert_eq!(parse_optional_duration("0ms").unwrap(), None);
        assert_eq!(
            parse_optional_duration("100ms").unwrap(),
            Some(Duration::from_millis(100))
        );
    }

    #[test]
    fn hex_payload_decodes() {
        let args = PayloadArgs {
            hex: Some("48 65 6c6C 6f".to_string()),
            ..PayloadArgs::default()
        };
        assert_eq!(args.resolve().unwrap(), b"Hello");
    }

    #[test]
    fn hex_payload_rejects_bad_input() {
        assert_eq!(parse_hex("abc").unwrap_err().code, USAGE);
        assert_eq!(parse_hex("zz").unwrap_err().code, USAGE);
    }

    #[test]
    fn missing_payload_is_empty() {
        assert!(PayloadArgs::default().resolve().unwrap().is_empty());
    }
}
