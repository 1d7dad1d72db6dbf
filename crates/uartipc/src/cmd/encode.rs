use tracing::info;
use uartipc_frame::{fragments, serialize};

use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_frames, FrameRecord, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let message = args.payload.resolve()?;

    let records: Vec<FrameRecord> = fragments(&message)
        .map_err(|err| frame_error("encode failed", err))?
        .enumerate()
        .map(|(index, frame)| FrameRecord::new(index, &frame))
        .collect();
    let wire = serialize(&message).map_err(|err| frame_error("encode failed", err))?;

    info!(
        message_len = message.len(),
        frames = records.len(),
        wire_len = wire.len(),
        "encoded message"
    );
    print_frames(&records, &wire, format);
    Ok(SUCCESS)
}
