//! End-to-end sessions with thread-backed bridges over loopback TCP.

#![cfg(unix)]

use std::sync::mpsc;
use std::time::{Duration, Instant};

use payloadlink_frame::{Packet, DATA_PI2_ACC_GYR, MSG_PI1, MSG_PI2};
use payloadlink_session::{BridgeHandle, BridgeMode, Client, Server, SessionConfig, SessionError};

fn config(label: &str) -> SessionConfig {
    SessionConfig::default()
        .with_mode(BridgeMode::Thread)
        .with_poll_interval(Duration::from_millis(1))
        .with_label(label)
}

fn recv_within(handle: &mut BridgeHandle, timeout: Duration) -> Packet {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(packet) = handle.recv_packet().expect("channel should stay open") {
            return packet;
        }
        assert!(Instant::now() < deadline, "no packet within {timeout:?}");
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn bound_server(label: &str) -> (Server, u16) {
    let mut server = Server::new(0, config(label));
    server.bind_and_listen().expect("server should bind");
    let port = server.local_addr().expect("bound address").port();
    (server, port)
}

#[test]
fn frames_cross_both_ways() {
    let (mut server, port) = bound_server("pi1");
    let (tx, rx) = mpsc::channel();
    let server_thread = std::thread::spawn(move || {
        server.accept().expect("server should accept");
        let mut handle = server.run().expect("server bridge should start");

        let packet = recv_within(&mut handle, Duration::from_secs(5));
        tx.send(packet).expect("test should be listening");
        assert!(handle
            .send_packet(MSG_PI1, packet.index + 1, b"ack")
            .expect("reply should queue"));
        // Keep the bridge up until the reply has left.
        std::thread::sleep(Duration::from_millis(100));
        handle.shutdown().expect("server shutdown");
    });

    let mut client = Client::new("127.0.0.1", port, config("pi2"));
    client
        .connect_with_retry(Duration::from_secs(5))
        .expect("client should connect");
    let mut handle = client.run().expect("client bridge should start");
    assert_eq!(handle.mode(), BridgeMode::Thread);
    assert!(handle.pid().is_none());

    assert!(handle
        .send_packet(MSG_PI2, 41, b"hello pi1")
        .expect("packet should queue"));
    let reply = recv_within(&mut handle, Duration::from_secs(5));
    assert_eq!(reply.id, MSG_PI1);
    assert_eq!(reply.index, 42);
    assert_eq!(reply.text().as_deref(), Some("ack"));

    let seen = rx.recv().expect("server should report");
    assert_eq!(seen.id, MSG_PI2);
    assert_eq!(seen.text().as_deref(), Some("hello pi1"));

    server_thread.join().expect("server thread should finish");
    handle.shutdown().expect("client shutdown");
}

#[test]
fn server_blocks_in_accept_until_client_connects() {
    let (mut server, port) = bound_server("pi1");
    let server_thread = std::thread::spawn(move || {
        let peer = server.accept().expect("server should accept");
        (server, peer)
    });

    std::thread::sleep(Duration::from_millis(150));
    assert!(!server_thread.is_finished(), "accept returned without a client");

    let mut client = Client::new("127.0.0.1", port, config("pi2"));
    client.connect().expect("client should connect");
    let (server, peer) = server_thread.join().expect("server thread should finish");
    assert_eq!(server.peer_addr(), Some(peer));
    assert!(peer.ip().is_loopback());
}

#[test]
fn burst_of_measurements_arrives_in_order() {
    let (mut server, port) = bound_server("pi1");
    let server_thread = std::thread::spawn(move || {
        server.accept().expect("server should accept");
        let mut handle = server.run().expect("server bridge should start");
        let indices: Vec<u16> = (0..20)
            .map(|_| recv_within(&mut handle, Duration::from_secs(5)).index)
            .collect();
        indices
    });

    let mut client = Client::new("127.0.0.1", port, config("pi2"));
    client.connect().expect("client should connect");
    let mut handle = client.run().expect("client bridge should start");
    for index in 0..20u16 {
        let sample = [index as u8; 12];
        while !handle
            .send_packet(DATA_PI2_ACC_GYR, index, &sample)
            .expect("channel should stay open")
        {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    let indices = server_thread.join().expect("server thread should finish");
    assert_eq!(indices, (0..20).collect::<Vec<_>>());
}

#[test]
fn peer_disconnect_closes_the_local_channel() {
    let (mut server, port) = bound_server("pi1");
    let server_thread = std::thread::spawn(move || {
        server.accept().expect("server should accept");
        server.run().expect("server bridge should start")
    });

    let mut client = Client::new("127.0.0.1", port, config("pi2"));
    client.connect().expect("client should connect");
    let mut client_handle = client.run().expect("client bridge should start");
    let mut server_handle = server_thread.join().expect("server thread should finish");

    // The client going away is seen by the server bridge, which exits and
    // closes its end of the channel.
    client_handle.shutdown().expect("client shutdown");

    let deadline = Instant::now() + Duration::from_secs(5);
    let err = loop {
        match server_handle.recv_frame() {
            Ok(_) => {
                assert!(Instant::now() < deadline, "server channel never closed");
                std::thread::sleep(Duration::from_millis(2));
            }
            Err(err) => break err,
        }
    };
    assert!(err.is_channel_closed(), "unexpected error: {err}");
    while server_handle.is_alive() {
        assert!(Instant::now() < deadline, "server bridge never exited");
        std::thread::sleep(Duration::from_millis(2));
    }
    server_handle.shutdown().expect("server shutdown");
}

#[test]
fn shutdown_is_idempotent_and_channel_is_closed_after() {
    let (mut server, port) = bound_server("pi1");
    let server_thread = std::thread::spawn(move || {
        server.accept().expect("server should accept");
        server.run().expect("server bridge should start")
    });

    let mut client = Client::new("127.0.0.1", port, config("pi2"));
    client.connect().expect("client should connect");
    let mut handle = client.run().expect("client bridge should start");
    assert!(handle.is_alive());

    handle.shutdown().expect("first shutdown");
    handle.shutdown().expect("second shutdown");
    assert!(!handle.is_alive());
    assert!(matches!(
        handle.send_packet(MSG_PI2, 1, b"late"),
        Err(SessionError::Channel(_))
    ));

    drop(server_thread.join().expect("server thread should finish"));
}
