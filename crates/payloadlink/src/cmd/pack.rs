use payloadlink_frame::pack;

use crate::cmd::PackArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: PackArgs, format: OutputFormat) -> CliResult<i32> {
    let id = args.packet.kind()?;
    let payload = args.packet.payload()?;
    let frame =
        pack(id, args.packet.index, &payload).map_err(|err| frame_error("pack failed", err))?;
    print_frame(&frame, id, args.packet.index, format);
    Ok(SUCCESS)
}
