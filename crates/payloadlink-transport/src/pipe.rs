use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Once;

use tracing::{debug, warn};

use crate::error::{ChannelError, ChannelResult};
use crate::poll::{poll_read, poll_write, Readiness};
use crate::traits::Duplex;

/// Which side of a fork a [`Pipe`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Unforked,
    Child,
    /// The parent, holding the child's pid.
    Parent(libc::pid_t),
}

/// Source of `fork(2)`, swappable so role handling can be tested without
/// spawning processes.
pub trait Forker {
    /// Returns 0 in the child and the child's pid in the parent.
    fn fork(&self) -> io::Result<libc::pid_t>;
}

/// The real `fork(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemForker;

impl Forker for SystemForker {
    fn fork(&self) -> io::Result<libc::pid_t> {
        // SAFETY: fork has no pointer arguments. The caller is responsible
        // for only doing fork-safe work in the child.
        let pid = unsafe { libc::fork() };
        if pid < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(pid)
    }
}

/// Two unidirectional OS pipes shared by a parent and a forked child.
///
/// Before the fork all four fds are open. Afterwards each side keeps one
/// read end and one write end and closes the other side's pair, so each fd
/// is owned by exactly one process.
#[derive(Debug)]
pub struct Pipe {
    /// Child to parent, read end.
    parent_read: Option<PipeFd>,
    /// Parent to child, write end.
    parent_write: Option<PipeFd>,
    /// Parent to child, read end.
    child_read: Option<PipeFd>,
    /// Child to parent, write end.
    child_write: Option<PipeFd>,
    role: Role,
}

impl Pipe {
    pub fn new() -> ChannelResult<Self> {
        ignore_sigpipe();
        let (child_read, parent_write) = os_pipe()?;
        let (parent_read, child_write) = os_pipe()?;
        Ok(Self {
            parent_read: Some(parent_read),
            parent_write: Some(parent_write),
            child_read: Some(child_read),
            child_write: Some(child_write),
            role: Role::Unforked,
        })
    }

    /// Fork the calling process and take up the resulting role.
    pub fn fork(&mut self) -> ChannelResult<Role> {
        self.fork_with(&SystemForker)
    }

    /// Like [`fork`](Self::fork) but with an explicit [`Forker`].
    pub fn fork_with<F: Forker + ?Sized>(&mut self, forker: &F) -> ChannelResult<Role> {
        if self.role != Role::Unforked {
            return Err(ChannelError::AlreadyForked);
        }
        let pid = forker.fork().map_err(ChannelError::Fork)?;
        if pid == 0 {
            self.parent_read = None;
            self.parent_write = None;
            self.role = Role::Child;
        } else {
            self.child_read = None;
            self.child_write = None;
            self.role = Role::Parent(pid);
            debug!(pid, "forked channel helper");
        }
        Ok(self.role)
    }

    /// Split an unforked pipe into `(parent_end, child_end)` for use from two
    /// threads of the same process.
    pub fn split(self) -> ChannelResult<(PipeEnd, PipeEnd)> {
        if self.role != Role::Unforked {
            return Err(ChannelError::AlreadyForked);
        }
        let parent = PipeEnd {
            read: self.parent_read,
            write: self.parent_write,
        };
        let child = PipeEnd {
            read: self.child_read,
            write: self.child_write,
        };
        Ok((parent, child))
    }

    /// Keep only the fds owned by the current role.
    pub fn into_end(self) -> ChannelResult<PipeEnd> {
        match self.role {
            Role::Unforked => Err(ChannelError::NotForked),
            Role::Child => Ok(PipeEnd {
                read: self.child_read,
                write: self.child_write,
            }),
            Role::Parent(_) => Ok(PipeEnd {
                read: self.parent_read,
                write: self.parent_write,
            }),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Read fd for the current role.
    pub fn read_fd(&self) -> ChannelResult<RawFd> {
        self.read_end()?
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or(ChannelError::Closed)
    }

    /// Write fd for the current role.
    pub fn write_fd(&self) -> ChannelResult<RawFd> {
        self.write_end()?
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or(ChannelError::Closed)
    }

    fn read_end(&self) -> ChannelResult<&Option<PipeFd>> {
        match self.role {
            Role::Unforked => Err(ChannelError::NotForked),
            Role::Child => Ok(&self.child_read),
            Role::Parent(_) => Ok(&self.parent_read),
        }
    }

    fn write_end(&self) -> ChannelResult<&Option<PipeFd>> {
        match self.role {
            Role::Unforked => Err(ChannelError::NotForked),
            Role::Child => Ok(&self.child_write),
            Role::Parent(_) => Ok(&self.parent_write),
        }
    }
}

impl Duplex for Pipe {
    fn read(&mut self, buf: &mut [u8]) -> ChannelResult<usize> {
        read_fd(self.read_end()?.as_ref(), buf)
    }

    fn write(&mut self, data: &[u8]) -> ChannelResult<usize> {
        write_fd(self.write_end()?.as_ref(), data)
    }

    /// Closes the fds this role owns; all four when unforked.
    fn close(&mut self) {
        self.parent_read = None;
        self.parent_write = None;
        self.child_read = None;
        self.child_write = None;
    }
}

/// One side of a [`Pipe`]: a read fd and a write fd.
#[derive(Debug)]
pub struct PipeEnd {
    read: Option<PipeFd>,
    write: Option<PipeFd>,
}

impl PipeEnd {
    pub fn read_fd(&self) -> Option<RawFd> {
        self.read.as_ref().map(AsRawFd::as_raw_fd)
    }

    pub fn write_fd(&self) -> Option<RawFd> {
        self.write.as_ref().map(AsRawFd::as_raw_fd)
    }

    pub fn is_closed(&self) -> bool {
        self.read.is_none() && self.write.is_none()
    }
}

impl Duplex for PipeEnd {
    fn read(&mut self, buf: &mut [u8]) -> ChannelResult<usize> {
        read_fd(self.read.as_ref(), buf)
    }

    fn write(&mut self, data: &[u8]) -> ChannelResult<usize> {
        write_fd(self.write.as_ref(), data)
    }

    fn close(&mut self) {
        self.read = None;
        self.write = None;
    }
}

/// A pipe fd listed in the process-wide table of channel fds for as long as
/// it is open, so a helper forked later can close its inherited copy.
#[derive(Debug)]
struct PipeFd(File);

impl PipeFd {
    fn new(file: File) -> Self {
        register_channel_fd(file.as_raw_fd());
        Self(file)
    }
}

impl AsRawFd for PipeFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

impl Drop for PipeFd {
    fn drop(&mut self) {
        unregister_channel_fd(self.0.as_raw_fd());
    }
}

const CHANNEL_FD_SLOTS: usize = 64;
const NO_FD: RawFd = -1;

/// Fds of every open channel pipe in this process. Plain atomics so
/// a freshly forked child can walk it without taking a lock another thread
/// may have held at fork time.
static CHANNEL_FDS: [AtomicI32; CHANNEL_FD_SLOTS] =
    [const { AtomicI32::new(NO_FD) }; CHANNEL_FD_SLOTS];

fn register_channel_fd(fd: RawFd) {
    for slot in &CHANNEL_FDS {
        if slot
            .compare_exchange(NO_FD, fd, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return;
        }
    }
    warn!(fd, "channel fd table full, later helpers will inherit this fd");
}

fn unregister_channel_fd(fd: RawFd) {
    for slot in &CHANNEL_FDS {
        if slot
            .compare_exchange(fd, NO_FD, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return;
        }
    }
}

/// Close the inherited copies of every registered pipe fd in a freshly
/// forked child, except those in `keep`.
///
/// Without this a helper holds the write end of every earlier helper's
/// channel, and closing that channel in the owner never reaches its reader
/// as EOF. The [`PipeFd`]s that owned these fds are never dropped in the
/// child, which leaves only through `_exit`.
pub(crate) fn close_channel_fds_except(keep: &[RawFd]) {
    for slot in &CHANNEL_FDS {
        let fd = slot.swap(NO_FD, Ordering::AcqRel);
        if fd != NO_FD && !keep.contains(&fd) {
            // SAFETY: the fd was open in the parent at fork time and nothing
            // in the child reads or drops its previous owner again.
            unsafe {
                libc::close(fd);
            }
        }
    }
}

#[cfg(test)]
fn is_registered_channel_fd(fd: RawFd) -> bool {
    CHANNEL_FDS
        .iter()
        .any(|slot| slot.load(Ordering::Acquire) == fd)
}

fn read_fd(file: Option<&PipeFd>, buf: &mut [u8]) -> ChannelResult<usize> {
    let mut file = &file.ok_or(ChannelError::Closed)?.0;
    if buf.is_empty() {
        return Ok(0);
    }
    match poll_read(file.as_raw_fd())? {
        Readiness::NotReady => return Ok(0),
        Readiness::HangUp => return Err(ChannelError::Closed),
        Readiness::Ready => {}
    }
    match file.read(buf) {
        Ok(0) => Err(ChannelError::Closed),
        Ok(n) => Ok(n),
        Err(e) if is_transient(&e) => Ok(0),
        Err(e) => Err(e.into()),
    }
}

fn write_fd(file: Option<&PipeFd>, data: &[u8]) -> ChannelResult<usize> {
    let mut file = &file.ok_or(ChannelError::Closed)?.0;
    if data.is_empty() {
        return Ok(0);
    }
    match poll_write(file.as_raw_fd())? {
        Readiness::NotReady => return Ok(0),
        Readiness::HangUp => return Err(ChannelError::Closed),
        Readiness::Ready => {}
    }
    match file.write(data) {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Err(ChannelError::Closed),
        Err(e) if is_transient(&e) => Ok(0),
        Err(e) => Err(e.into()),
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Create a registered pipe with both ends non-blocking and close-on-exec.
fn os_pipe() -> io::Result<(PipeFd, PipeFd)> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: `fds` has room for the two descriptors pipe(2) writes.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: pipe(2) succeeded, so both fds are open and owned by nobody else.
    let (read, write) = unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) };
    for fd in [read.as_raw_fd(), write.as_raw_fd()] {
        set_flags(fd)?;
    }
    Ok((PipeFd::new(read), PipeFd::new(write)))
}

fn set_flags(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl on an fd we own with integer arguments only.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
        let fd_flags = libc::fcntl(fd, libc::F_GETFD);
        if fd_flags < 0 || libc::fcntl(fd, libc::F_SETFD, fd_flags | libc::FD_CLOEXEC) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Writes to a pipe whose reader is gone must fail with `EPIPE` instead of
/// killing the process.
fn ignore_sigpipe() {
    static IGNORE: Once = Once::new();
    IGNORE.call_once(|| {
        // SAFETY: installing SIG_IGN for SIGPIPE has no memory-safety impact.
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        }
    });
}
