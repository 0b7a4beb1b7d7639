//! A session whose bridges run in forked helper processes. Kept in its own
//! test binary so the forks only see this file's threads.

#![cfg(unix)]

use std::time::{Duration, Instant};

use payloadlink_frame::{Packet, MSG_PI1, STATUS_PI2};
use payloadlink_session::{BridgeHandle, BridgeMode, Client, Server, SessionConfig};

fn recv_within(handle: &mut BridgeHandle, timeout: Duration) -> Packet {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(packet) = handle.recv_packet().expect("channel should stay open") {
            return packet;
        }
        assert!(Instant::now() < deadline, "no packet within {timeout:?}");
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn process_bridges_exchange_and_shut_down() {
    let config = SessionConfig::default()
        .with_mode(BridgeMode::Process)
        .with_poll_interval(Duration::from_millis(1))
        .with_shutdown_grace(Duration::from_secs(5));

    let mut server = Server::new(0, config.clone().with_label("pi1"));
    server.bind_and_listen().expect("server should bind");
    let port = server.local_addr().expect("bound address").port();

    let mut client = Client::new("127.0.0.1", port, config.with_label("pi2"));
    client.connect().expect("client should connect");
    server.accept().expect("server should accept");

    let mut server_handle = server.run().expect("server bridge should fork");
    let mut client_handle = client.run().expect("client bridge should fork");
    assert!(server_handle.pid().is_some());
    assert!(client_handle.is_alive());

    assert!(client_handle
        .send_packet(STATUS_PI2, 3, b"go")
        .expect("packet should queue"));
    let packet = recv_within(&mut server_handle, Duration::from_secs(5));
    assert_eq!((packet.id, packet.index), (STATUS_PI2, 3));

    assert!(server_handle
        .send_packet(MSG_PI1, 4, b"roger")
        .expect("packet should queue"));
    let reply = recv_within(&mut client_handle, Duration::from_secs(5));
    assert_eq!(reply.text().as_deref(), Some("roger"));

    // The server helper was forked first; the client helper forked after it
    // must not keep its channel open, so it drains and exits well inside
    // the grace period instead of being signalled.
    let started = Instant::now();
    server_handle.shutdown().expect("server shutdown");
    assert!(!server_handle.is_alive());
    assert!(
        started.elapsed() < Duration::from_secs(3),
        "server helper only stopped after {:?}",
        started.elapsed()
    );
    client_handle.shutdown().expect("client shutdown");
    assert!(!client_handle.is_alive());
}
