use payloadlink_frame::{unpack, Frame, FRAME_SIZE};

use crate::cmd::UnpackArgs;
use crate::exit::{frame_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_packet, OutputFormat};

pub fn run(args: UnpackArgs, format: OutputFormat) -> CliResult<i32> {
    let frame = Frame::from_hex(&args.frame).ok_or_else(|| {
        CliError::new(
            USAGE,
            format!("frame must be {} hex digits", FRAME_SIZE * 2),
        )
    })?;
    let packet = unpack(&frame).map_err(|err| frame_error("unpack failed", err))?;
    print_packet(&packet, "argument", format);
    Ok(SUCCESS)
}
