use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use payloadlink_frame::unpack;
use payloadlink_session::BackupLog;
use payloadlink_transport::{BaudRate, SerialConfig, SerialPort, Transceiver};
use tracing::{info, warn};

use crate::cmd::{install_ctrlc_handler, parse_duration, GlobalOptions, SerialArgs};
use crate::exit::{session_error, transport_error, CliResult, SUCCESS};
use crate::output::print_packet;

pub fn run(args: SerialArgs, options: &GlobalOptions) -> CliResult<i32> {
    let interval = parse_duration(&options.poll_interval)?;
    let baud = BaudRate::try_from(args.baud).map_err(|err| transport_error("serial", err))?;
    let config = SerialConfig::new(&args.device).with_baud(baud);
    let port = SerialPort::open(&config).map_err(|err| transport_error("open failed", err))?;
    let source = port.path().display().to_string();
    let mut backup = options
        .backup
        .as_ref()
        .map(BackupLog::open)
        .transpose()
        .map_err(|err| session_error("backup failed", err))?;
    let mut link = Transceiver::new(port);

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let frame = match link
            .recv_packet()
            .map_err(|err| transport_error("receive failed", err))?
        {
            Some(frame) => frame,
            None => {
                std::thread::sleep(interval);
                continue;
            }
        };

        let packet = match unpack(&frame) {
            Ok(packet) => packet,
            Err(err) => {
                warn!(error = %err, "dropping undecodable frame");
                continue;
            }
        };
        if let Some(backup) = backup.as_mut() {
            backup
                .record(&packet)
                .map_err(|err| session_error("backup failed", err))?;
        }
        print_packet(&packet, &source, options.format);
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    let stats = link.stats();
    info!(
        frames = stats.frames,
        discarded_bytes = stats.discarded_bytes,
        "serial link closed"
    );
    Ok(SUCCESS)
}
