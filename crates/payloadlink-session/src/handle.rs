use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use payloadlink_frame::{pack, unpack, Frame, Packet};
use payloadlink_transport::{fork_helper, ChannelError, ChildProcess, Duplex, Pipe, PipeEnd};
use tracing::{debug, info, warn};

use crate::backup::BackupLog;
use crate::bridge::{Bridge, BridgeExit, ThreadPacer};
use crate::config::{BridgeMode, SessionConfig};
use crate::error::{Result, SessionError};

/// Exit codes of a forked bridge helper.
const EXIT_CLEAN: i32 = 0;
const EXIT_FAILED: i32 = 1;
const EXIT_DISCONNECTED: i32 = 2;

enum Helper {
    Process(ChildProcess),
    Thread {
        stop: Arc<AtomicBool>,
        join: JoinHandle<Result<BridgeExit>>,
    },
    Finished,
}

/// The local side of a running bridge.
///
/// Frames sent here go out over the network; frames the peer sends can be
/// read back here. Dropping the handle shuts the bridge down.
pub struct BridgeHandle {
    channel: PipeEnd,
    helper: Helper,
    mode: BridgeMode,
    grace: Duration,
}

impl BridgeHandle {
    /// Start a bridge for `stream` as configured.
    pub(crate) fn spawn<S>(stream: S, peer: String, config: &SessionConfig) -> Result<Self>
    where
        S: Read + Write + AsRawFd + Send + 'static,
    {
        let backup = config
            .backup_path
            .as_ref()
            .map(BackupLog::open)
            .transpose()?;
        let label = config.label.clone();
        let interval = config.poll_interval;
        let build = move |end: PipeEnd| {
            let bridge = Bridge::new(stream, end)
                .with_label(label)
                .with_peer(peer)
                .with_poll_interval(interval);
            match backup {
                Some(backup) => bridge.with_backup(backup),
                None => bridge,
            }
        };

        let (channel, helper) = match config.mode {
            BridgeMode::Process => {
                let (channel, child) = fork_helper(move |end| {
                    let stop = AtomicBool::new(false);
                    match build(end).run(&stop, &mut ThreadPacer) {
                        Ok(_) => EXIT_CLEAN,
                        Err(SessionError::Disconnected(_)) => EXIT_DISCONNECTED,
                        Err(_) => EXIT_FAILED,
                    }
                })?;
                info!(pid = child.pid(), "bridge helper forked");
                (channel, Helper::Process(child))
            }
            BridgeMode::Thread => {
                let (channel, end) = Pipe::new()?.split()?;
                let stop = Arc::new(AtomicBool::new(false));
                let flag = Arc::clone(&stop);
                let join = std::thread::Builder::new()
                    .name(format!("{}-bridge", config.label))
                    .spawn(move || build(end).run(&flag, &mut ThreadPacer))
                    .map_err(ChannelError::from)?;
                info!("bridge thread started");
                (channel, Helper::Thread { stop, join })
            }
        };

        Ok(Self {
            channel,
            helper,
            mode: config.mode,
            grace: config.shutdown_grace,
        })
    }

    /// The local channel end, for callers that want the raw [`Duplex`].
    pub fn channel(&mut self) -> &mut PipeEnd {
        &mut self.channel
    }

    pub fn mode(&self) -> BridgeMode {
        self.mode
    }

    /// Pid of the helper process, in process mode.
    pub fn pid(&self) -> Option<i32> {
        match &self.helper {
            Helper::Process(child) => Some(child.pid()),
            _ => None,
        }
    }

    /// Queue a frame for the peer. `Ok(false)` if the channel is full.
    pub fn send_frame(&mut self, frame: &Frame) -> Result<bool> {
        Ok(self.channel.send_frame(frame)?)
    }

    /// Next frame from the peer, if one has arrived.
    pub fn recv_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.channel.recv_frame()?)
    }

    /// Pack and queue a packet for the peer.
    pub fn send_packet(&mut self, id: u8, index: u16, payload: &[u8]) -> Result<bool> {
        let frame = pack(id, index, payload)?;
        self.send_frame(&frame)
    }

    /// Next decoded packet from the peer, if one has arrived.
    pub fn recv_packet(&mut self) -> Result<Option<Packet>> {
        match self.recv_frame()? {
            Some(frame) => Ok(Some(unpack(&frame)?)),
            None => Ok(None),
        }
    }

    pub fn is_alive(&mut self) -> bool {
        match &mut self.helper {
            Helper::Process(child) => child.is_alive(),
            Helper::Thread { join, .. } => !join.is_finished(),
            Helper::Finished => false,
        }
    }

    /// Close the channel and stop the helper.
    ///
    /// Closing the channel asks the bridge to finish: it forwards anything
    /// already queued and exits. A helper still running after the grace
    /// period is stopped harder. A process gets SIGTERM, then SIGKILL after
    /// another grace period; a thread is flagged to stop and joined.
    /// Calling this more than once is a no-op.
    pub fn shutdown(&mut self) -> Result<()> {
        self.channel.close();
        match std::mem::replace(&mut self.helper, Helper::Finished) {
            Helper::Process(mut child) => {
                let pid = child.pid();
                let failed =
                    |e: std::io::Error| SessionError::ShutdownFailed(format!("helper {pid}: {e}"));
                let state = match child.wait_timeout(self.grace).map_err(failed)? {
                    Some(state) => state,
                    None => child.terminate(self.grace).map_err(failed)?,
                };
                info!(pid, %state, "bridge helper stopped");
            }
            Helper::Thread { stop, join } => {
                let deadline = Instant::now() + self.grace;
                while !join.is_finished() && Instant::now() < deadline {
                    std::thread::sleep(Duration::from_millis(1));
                }
                stop.store(true, Ordering::Relaxed);
                match join.join() {
                    Ok(Ok(exit)) => info!(?exit, "bridge thread stopped"),
                    Ok(Err(err)) => debug!(error = %err, "bridge thread ended with error"),
                    Err(_) => {
                        return Err(SessionError::ShutdownFailed(
                            "bridge thread panicked".to_string(),
                        ))
                    }
                }
            }
            Helper::Finished => {}
        }
        Ok(())
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(error = %err, "bridge shutdown on drop failed");
        }
    }
}

impl std::fmt::Debug for BridgeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let helper = match &self.helper {
            Helper::Process(child) => format!("process({})", child.pid()),
            Helper::Thread { .. } => "thread".to_string(),
            Helper::Finished => "finished".to_string(),
        };
        f.debug_struct("BridgeHandle")
            .field("mode", &self.mode)
            .field("helper", &helper)
            .finish()
    }
}
