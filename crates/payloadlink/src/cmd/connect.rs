use std::time::{Duration, Instant};

use payloadlink_frame::{pack, Packet};
use payloadlink_session::{BridgeHandle, Client, SessionError};

use crate::cmd::{parse_duration, ConnectArgs, GlobalOptions};
use crate::exit::{frame_error, session_error, CliResult, SUCCESS};
use crate::output::print_packet;

pub fn run(args: ConnectArgs, options: &GlobalOptions) -> CliResult<i32> {
    let id = args.packet.kind()?;
    let payload = args.packet.payload()?;
    let frame =
        pack(id, args.packet.index, &payload).map_err(|err| frame_error("pack failed", err))?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;

    let config = options.session_config("connect")?;
    let interval = config.poll_interval;
    let mut client = Client::new(args.host.as_str(), args.port, config);
    let connected = match &args.retry_for {
        Some(retry_for) => client.connect_with_retry(parse_duration(retry_for)?),
        None => client.connect(),
    };
    connected.map_err(|err| session_error("connect failed", err))?;

    let source = client
        .peer_addr()
        .map_or_else(|| format!("{}:{}", args.host, args.port), |a| a.to_string());
    let mut handle = client
        .run()
        .map_err(|err| session_error("bridge failed", err))?;

    while !handle
        .send_frame(&frame)
        .map_err(|err| session_error("send failed", err))?
    {
        std::thread::sleep(interval);
    }

    let reply = if args.wait {
        Some(
            wait_for_packet(&mut handle, wait_timeout, interval)
                .map_err(|err| session_error("receive failed", err))?,
        )
    } else {
        None
    };

    handle
        .shutdown()
        .map_err(|err| session_error("shutdown failed", err))?;

    if let Some(packet) = reply {
        print_packet(&packet, &source, options.format);
    }
    Ok(SUCCESS)
}

/// Poll the bridge channel until a packet arrives or `timeout` passes.
fn wait_for_packet(
    handle: &mut BridgeHandle,
    timeout: Duration,
    interval: Duration,
) -> Result<Packet, SessionError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(packet) = handle.recv_packet()? {
            return Ok(packet);
        }
        if Instant::now() >= deadline {
            return Err(SessionError::Timeout(timeout));
        }
        std::thread::sleep(interval);
    }
}
