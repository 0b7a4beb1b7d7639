use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use payloadlink_frame::{unpack, Frame, Packet};
use payloadlink_transport::{ChannelError, Duplex, Transceiver, TransportError};
use tracing::{debug, info, info_span, trace, warn};

use crate::backup::BackupLog;
use crate::error::{Result, SessionError};

/// Waits between bridge iterations.
pub trait Pacer {
    fn pause(&mut self, interval: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&mut self, interval: Duration) {
        std::thread::sleep(interval);
    }
}

/// Result of one bridge iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// The local channel is gone; the bridge should stop.
    ChannelClosed,
}

/// Why [`Bridge::run`] returned normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeExit {
    ChannelClosed,
    Stopped,
}

/// Counters kept by a running bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Frames relayed from the network to the local channel.
    pub received: u64,
    /// Frames relayed from the local channel to the network.
    pub sent: u64,
    /// Frames that arrived intact but failed to decode.
    pub decode_errors: u64,
    /// Candidates the stream resynchronizer threw away.
    pub framing_errors: u64,
    pub discarded_bytes: u64,
}

/// Moves frames between a network stream and a local channel.
///
/// Inbound frames are only relayed once they decode; anything else is
/// logged and counted. Each direction holds at most one frame that the
/// other side has not accepted yet: outbound frames wait for the socket,
/// inbound frames wait for room in the channel.
pub struct Bridge<S, C> {
    network: Transceiver<S>,
    channel: C,
    backup: Option<BackupLog>,
    in_flight: Option<Frame>,
    pending_inbound: Option<(Frame, Packet)>,
    stats: BridgeStats,
    label: String,
    peer: String,
    poll_interval: Duration,
}

impl<S, C> Bridge<S, C>
where
    S: Read + Write + AsRawFd,
    C: Duplex,
{
    pub fn new(stream: S, channel: C) -> Self {
        Self {
            network: Transceiver::new(stream),
            channel,
            backup: None,
            in_flight: None,
            pending_inbound: None,
            stats: BridgeStats::default(),
            label: "bridge".to_string(),
            peer: String::new(),
            poll_interval: Duration::from_millis(5),
        }
    }

    pub fn with_backup(mut self, backup: BackupLog) -> Self {
        self.backup = Some(backup);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = peer.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// One pass: relay at most one inbound frame, pick up an outbound frame
    /// if none is pending, and try to send it.
    ///
    /// Never blocks. An inbound frame the channel cannot take yet is held
    /// and retried on the next pass, and the network is not read while it
    /// is held, so a slow owner pushes back on the peer through TCP.
    pub fn step(&mut self) -> Result<Step> {
        if self.pending_inbound.is_none() {
            match self.network.recv_packet() {
                Ok(Some(frame)) => self.accept_inbound(frame),
                Ok(None) => {}
                Err(TransportError::Hangup) => return Err(self.hung_up()),
                Err(err) => return Err(err.into()),
            }
        }

        if let Some((frame, packet)) = self.pending_inbound.take() {
            match self.channel.send_frame(&frame) {
                Ok(true) => self.delivered(&packet),
                Ok(false) => {
                    trace!("channel full, holding inbound frame");
                    self.pending_inbound = Some((frame, packet));
                }
                Err(ChannelError::Closed) => return Ok(Step::ChannelClosed),
                Err(err) => return Err(err.into()),
            }
        }

        match self.network.flush() {
            Ok(_) => {}
            Err(TransportError::Hangup) => return Err(self.hung_up()),
            Err(err) => return Err(err.into()),
        }

        if self.in_flight.is_none() {
            match self.channel.recv_frame() {
                Ok(frame) => self.in_flight = frame,
                Err(ChannelError::Closed) => return Ok(Step::ChannelClosed),
                Err(err) => return Err(err.into()),
            }
        }

        if let Some(frame) = self.in_flight {
            match self.network.send_packet(&frame) {
                Ok(0) => trace!("network not writable, holding frame"),
                Ok(_) => {
                    self.in_flight = None;
                    self.stats.sent += 1;
                    trace!(id = frame.id(), "relayed outbound frame");
                }
                Err(TransportError::Hangup) => return Err(self.hung_up()),
                Err(err) => return Err(err.into()),
            }
        }

        Ok(Step::Continue)
    }

    /// Step until the channel closes, the peer disconnects, or `stop` is set.
    ///
    /// The channel end is closed on the way out so the owner notices.
    pub fn run<P: Pacer>(&mut self, stop: &AtomicBool, pacer: &mut P) -> Result<BridgeExit> {
        let span = info_span!("bridge", side = %self.label, peer = %self.peer);
        let _enter = span.enter();
        info!(interval = ?self.poll_interval, "bridge running");

        let outcome = loop {
            if stop.load(Ordering::Relaxed) {
                break Ok(BridgeExit::Stopped);
            }
            match self.step() {
                Ok(Step::Continue) => pacer.pause(self.poll_interval),
                Ok(Step::ChannelClosed) => break Ok(BridgeExit::ChannelClosed),
                Err(err) => break Err(err),
            }
        };

        self.channel.close();
        let stats = self.stats();
        match &outcome {
            Ok(exit) => info!(?exit, ?stats, "bridge stopped"),
            Err(err) => warn!(error = %err, ?stats, "bridge stopped"),
        }
        outcome
    }

    pub fn stats(&self) -> BridgeStats {
        let resync = self.network.stats();
        BridgeStats {
            framing_errors: resync.framing_errors,
            discarded_bytes: resync.discarded_bytes,
            ..self.stats
        }
    }

    /// Frame taken from the channel but not yet accepted by the network.
    pub fn in_flight(&self) -> Option<&Frame> {
        self.in_flight.as_ref()
    }

    /// Inbound frame read from the network but not yet taken by the channel.
    pub fn pending_inbound(&self) -> Option<&Frame> {
        self.pending_inbound.as_ref().map(|(frame, _)| frame)
    }

    fn accept_inbound(&mut self, frame: Frame) {
        match unpack(&frame) {
            Ok(packet) => self.pending_inbound = Some((frame, packet)),
            Err(err) => {
                self.stats.decode_errors += 1;
                warn!(error = %err, frame = %frame.to_hex(), "discarding undecodable frame");
            }
        }
    }

    fn delivered(&mut self, packet: &Packet) {
        self.stats.received += 1;
        debug!(%packet, "relayed inbound packet");

        if let Some(backup) = self.backup.as_mut() {
            if let Err(err) = backup.record(packet) {
                warn!(error = %err, "backup write failed");
            }
        }
    }

    fn hung_up(&self) -> SessionError {
        SessionError::Disconnected(format!("{} hung up", self.peer_name()))
    }

    fn peer_name(&self) -> &str {
        if self.peer.is_empty() {
            "peer"
        } else {
            &self.peer
        }
    }
}
