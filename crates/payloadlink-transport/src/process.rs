use std::fmt;
use std::io;
use std::os::fd::RawFd;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{ChannelError, ChannelResult};
use crate::pipe::{close_channel_fds_except, Pipe, PipeEnd, Role};

const REAP_POLL: Duration = Duration::from_millis(10);

/// Exit code used when a helper closure panics.
const PANIC_EXIT_CODE: i32 = 101;

/// How a reaped child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    Exited(i32),
    Signaled(i32),
}

impl ExitState {
    fn from_status(status: libc::c_int) -> Self {
        if libc::WIFSIGNALED(status) {
            Self::Signaled(libc::WTERMSIG(status))
        } else {
            Self::Exited(libc::WEXITSTATUS(status))
        }
    }
}

impl fmt::Display for ExitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {code}"),
            Self::Signaled(sig) => write!(f, "killed by signal {sig}"),
        }
    }
}

/// A forked child that this process is responsible for reaping.
#[derive(Debug)]
pub struct ChildProcess {
    pid: libc::pid_t,
    exit: Option<ExitState>,
}

impl ChildProcess {
    pub fn from_pid(pid: libc::pid_t) -> Self {
        Self { pid, exit: None }
    }

    pub fn pid(&self) -> libc::pid_t {
        self.pid
    }

    /// Reap the child if it has exited, without blocking.
    pub fn try_wait(&mut self) -> io::Result<Option<ExitState>> {
        if self.exit.is_some() {
            return Ok(self.exit);
        }
        self.exit = waitpid(self.pid, libc::WNOHANG)?;
        Ok(self.exit)
    }

    /// Block until the child exits.
    pub fn wait(&mut self) -> io::Result<ExitState> {
        if let Some(state) = self.exit {
            return Ok(state);
        }
        loop {
            if let Some(state) = waitpid(self.pid, 0)? {
                self.exit = Some(state);
                return Ok(state);
            }
        }
    }

    /// Poll for exit until `timeout` passes. `Ok(None)` if still running.
    pub fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ExitState>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(state) = self.try_wait()? {
                return Ok(Some(state));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(REAP_POLL);
        }
    }

    pub fn is_alive(&mut self) -> bool {
        matches!(self.try_wait(), Ok(None))
    }

    /// Stop the child: SIGTERM, wait up to `grace`, then SIGKILL and reap.
    pub fn terminate(&mut self, grace: Duration) -> io::Result<ExitState> {
        if let Some(state) = self.try_wait()? {
            return Ok(state);
        }

        debug!(pid = self.pid, "sending SIGTERM to helper");
        signal(self.pid, libc::SIGTERM)?;
        if let Some(state) = self.wait_timeout(grace)? {
            debug!(pid = self.pid, %state, "helper exited after SIGTERM");
            return Ok(state);
        }

        warn!(pid = self.pid, ?grace, "helper ignored SIGTERM, sending SIGKILL");
        signal(self.pid, libc::SIGKILL)?;
        self.wait()
    }
}

/// Run `helper` in a forked child connected to the caller by a [`Pipe`].
///
/// The parent gets its end of the channel and the child handle. The child
/// runs `helper` with its own end and exits with the returned code without
/// returning to the caller; a panic exits with code 101.
///
/// Before `helper` runs the child closes its copies of every other helper's
/// owner-side channel fds, so each channel keeps exactly one owner and
/// closing it still reaches its helper as EOF.
pub fn fork_helper<F>(helper: F) -> ChannelResult<(PipeEnd, ChildProcess)>
where
    F: FnOnce(PipeEnd) -> i32,
{
    let mut pipe = Pipe::new()?;
    match pipe.fork()? {
        Role::Child => {
            let code = match pipe.into_end() {
                Ok(end) => {
                    let keep: [RawFd; 2] = [
                        end.read_fd().unwrap_or(-1),
                        end.write_fd().unwrap_or(-1),
                    ];
                    close_channel_fds_except(&keep);
                    catch_unwind(AssertUnwindSafe(|| helper(end))).unwrap_or(PANIC_EXIT_CODE)
                }
                Err(_) => 1,
            };
            // SAFETY: `_exit` skips atexit handlers and stdio flushing that
            // belong to the parent's copy of the address space.
            unsafe { libc::_exit(code) }
        }
        Role::Parent(pid) => Ok((pipe.into_end()?, ChildProcess::from_pid(pid))),
        Role::Unforked => Err(ChannelError::NotForked),
    }
}

fn waitpid(pid: libc::pid_t, flags: libc::c_int) -> io::Result<Option<ExitState>> {
    loop {
        let mut status: libc::c_int = 0;
        // SAFETY: `status` is a valid out-pointer for the duration of the call.
        let rc = unsafe { libc::waitpid(pid, &mut status, flags) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if rc == 0 {
            return Ok(None);
        }
        return Ok(Some(ExitState::from_status(status)));
    }
}

fn signal(pid: libc::pid_t, sig: libc::c_int) -> io::Result<()> {
    // SAFETY: kill(2) takes plain integers.
    if unsafe { libc::kill(pid, sig) } < 0 {
        let err = io::Error::last_os_error();
        // Already gone but not yet reaped is fine; the caller reaps next.
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_state_display() {
        assert_eq!(ExitState::Exited(0).to_string(), "exited with code 0");
        assert_eq!(
            ExitState::Signaled(libc::SIGKILL).to_string(),
            format!("killed by signal {}", libc::SIGKILL)
        );
    }

    #[test]
    fn decodes_wait_status() {
        // Encoded the way the kernel reports them: exit code in bits 8..16,
        // terminating signal in the low 7 bits.
        assert_eq!(ExitState::from_status(3 << 8), ExitState::Exited(3));
        assert_eq!(
            ExitState::from_status(libc::SIGTERM),
            ExitState::Signaled(libc::SIGTERM)
        );
    }

    #[test]
    fn waiting_on_a_non_child_fails() {
        // pid 1 is never our child.
        let mut child = ChildProcess::from_pid(1);
        assert!(child.try_wait().is_err());
        assert!(!child.is_alive());
    }
}
