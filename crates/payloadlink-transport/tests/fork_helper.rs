//! Real `fork(2)` round trips. Kept in their own test binary so the forked
//! children only ever see this file's threads.

#![cfg(unix)]

use std::time::{Duration, Instant};

use payloadlink_frame::{pack, unpack, Frame, MSG_PI1};
use payloadlink_transport::{fork_helper, ChannelError, Duplex, ExitState, PipeEnd};

fn recv_within(end: &mut PipeEnd, timeout: Duration) -> Option<Frame> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(frame) = end.recv_frame().expect("channel should stay open") {
            return Some(frame);
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    None
}

fn echo(mut end: PipeEnd) -> i32 {
    loop {
        match end.recv_frame() {
            Ok(Some(frame)) => loop {
                match end.send_frame(&frame) {
                    Ok(true) => break,
                    Ok(false) => std::thread::sleep(Duration::from_millis(1)),
                    Err(_) => return 1,
                }
            },
            Ok(None) => std::thread::sleep(Duration::from_millis(1)),
            Err(ChannelError::Closed) => return 7,
            Err(_) => return 1,
        }
    }
}

#[test]
fn forked_echo_helper_round_trip_and_exit_code() {
    let (mut end, mut child) = fork_helper(echo).expect("fork should succeed");
    assert!(child.is_alive());

    let frame = pack(MSG_PI1, 77, b"ping").unwrap();
    assert!(end.send_frame(&frame).unwrap());
    let echoed = recv_within(&mut end, Duration::from_secs(5)).expect("echo should arrive");
    assert_eq!(unpack(&echoed).unwrap().index, 77);

    // Closing our end is how the helper learns to stop.
    end.close();
    let state = child.wait().expect("child should be reaped");
    assert_eq!(state, ExitState::Exited(7));
}

#[test]
fn closing_first_channel_stops_its_helper_while_a_later_one_runs() {
    let (mut first_end, mut first) = fork_helper(echo).expect("first fork should succeed");
    let (mut second_end, mut second) = fork_helper(echo).expect("second fork should succeed");

    first_end.close();
    let state = first
        .wait_timeout(Duration::from_secs(2))
        .expect("first helper should be reapable");
    assert_eq!(state, Some(ExitState::Exited(7)));
    assert!(second.is_alive(), "second helper only stops when its own channel closes");

    let frame = pack(MSG_PI1, 9, b"still up").unwrap();
    assert!(second_end.send_frame(&frame).unwrap());
    let echoed =
        recv_within(&mut second_end, Duration::from_secs(5)).expect("echo should arrive");
    assert_eq!(unpack(&echoed).unwrap().index, 9);

    second_end.close();
    assert_eq!(
        second.wait_timeout(Duration::from_secs(2)).unwrap(),
        Some(ExitState::Exited(7))
    );
}

#[test]
fn terminate_escalates_to_sigkill() {
    let (mut end, mut child) = fork_helper(|mut end| {
        // SAFETY: installing SIG_IGN has no memory-safety impact.
        unsafe {
            libc::signal(libc::SIGTERM, libc::SIG_IGN);
        }
        let _ = end.write(b"r");
        loop {
            std::thread::sleep(Duration::from_millis(50));
        }
    })
    .expect("fork should succeed");

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut ready = [0u8; 1];
    while end.read(&mut ready).unwrap() == 0 {
        assert!(Instant::now() < deadline, "helper never became ready");
        std::thread::sleep(Duration::from_millis(2));
    }

    let started = Instant::now();
    let state = child
        .terminate(Duration::from_millis(100))
        .expect("terminate should reap");
    assert_eq!(state, ExitState::Signaled(libc::SIGKILL));
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(!child.is_alive());
}

#[test]
fn terminate_stops_a_cooperative_helper_with_sigterm() {
    let (_end, mut child) = fork_helper(|_end| loop {
        std::thread::sleep(Duration::from_millis(50));
    })
    .expect("fork should succeed");

    let state = child
        .terminate(Duration::from_secs(5))
        .expect("terminate should reap");
    assert_eq!(state, ExitState::Signaled(libc::SIGTERM));
}
