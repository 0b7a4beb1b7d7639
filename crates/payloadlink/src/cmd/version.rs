use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("payloadlink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: payloadlink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("PAYLOADLINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "frame: {} bytes, crc16 generator 0x{:04X}",
        payloadlink_frame::FRAME_SIZE,
        payloadlink_frame::CRC_GENERATOR
    );
    println!(
        "features: session=true, async={}, cli=true",
        cfg!(feature = "async")
    );

    Ok(SUCCESS)
}
