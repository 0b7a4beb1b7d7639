use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use payloadlink_frame::unpack;
use payloadlink_session::{BridgeHandle, Server};
use tracing::{info, warn};

use crate::cmd::{install_ctrlc_handler, GlobalOptions, ServeArgs};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_packet, OutputFormat};

pub fn run(args: ServeArgs, options: &GlobalOptions) -> CliResult<i32> {
    let config = options.session_config("serve")?;
    let interval = config.poll_interval;
    let mut server = Server::new(args.port, config);
    server
        .bind_and_listen()
        .map_err(|err| session_error("bind failed", err))?;
    if let Ok(addr) = server.local_addr() {
        info!(%addr, "listening");
    }

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        // Polled so that Ctrl-C is noticed while no peer is connected.
        let Some(peer) = server
            .try_accept()
            .map_err(|err| session_error("accept failed", err))?
        else {
            std::thread::sleep(interval);
            continue;
        };
        let mut handle = server
            .run()
            .map_err(|err| session_error("bridge failed", err))?;
        let source = peer.to_string();

        let outcome = relay(
            &mut handle,
            &args,
            &source,
            options.format,
            interval,
            &running,
            &mut printed,
        );
        handle
            .shutdown()
            .map_err(|err| session_error("shutdown failed", err))?;

        match outcome? {
            Session::Done => return Ok(SUCCESS),
            Session::PeerGone => info!(peer = %source, "peer gone, waiting for the next one"),
        }
    }

    Ok(SUCCESS)
}

enum Session {
    /// Stop serving: count reached or interrupted.
    Done,
    /// The bridge exited; accept another peer.
    PeerGone,
}

fn relay(
    handle: &mut BridgeHandle,
    args: &ServeArgs,
    source: &str,
    format: OutputFormat,
    interval: Duration,
    running: &AtomicBool,
    printed: &mut usize,
) -> CliResult<Session> {
    while running.load(Ordering::SeqCst) {
        let frame = match handle.recv_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                std::thread::sleep(interval);
                continue;
            }
            Err(err) if err.is_channel_closed() => return Ok(Session::PeerGone),
            Err(err) => return Err(session_error("receive failed", err)),
        };

        match unpack(&frame) {
            Ok(packet) => print_packet(&packet, source, format),
            Err(err) => {
                warn!(error = %err, "dropping undecodable frame");
                continue;
            }
        }
        *printed = printed.saturating_add(1);

        if args.echo {
            while !handle
                .send_frame(&frame)
                .map_err(|err| session_error("echo failed", err))?
            {
                std::thread::sleep(interval);
            }
        }

        if let Some(count) = args.count {
            if *printed >= count {
                return Ok(Session::Done);
            }
        }
    }
    Ok(Session::Done)
}
