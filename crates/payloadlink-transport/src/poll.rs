use std::io;
use std::os::fd::RawFd;

/// Outcome of a zero-timeout readiness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The requested operation will not block.
    Ready,
    /// Nothing to do right now.
    NotReady,
    /// The other end is gone (hangup or error condition on the fd).
    HangUp,
}

/// Check whether `fd` can be read without blocking.
///
/// Pending data wins over a hangup so the last bytes sent before a close are
/// still delivered.
pub fn poll_read(fd: RawFd) -> io::Result<Readiness> {
    let revents = poll_once(fd, libc::POLLIN)?;
    if revents & libc::POLLIN != 0 {
        Ok(Readiness::Ready)
    } else if revents & (libc::POLLHUP | libc::POLLERR) != 0 {
        Ok(Readiness::HangUp)
    } else {
        Ok(Readiness::NotReady)
    }
}

/// Check whether `fd` can be written without blocking.
pub fn poll_write(fd: RawFd) -> io::Result<Readiness> {
    let revents = poll_once(fd, libc::POLLOUT)?;
    if revents & (libc::POLLHUP | libc::POLLERR) != 0 {
        Ok(Readiness::HangUp)
    } else if revents & libc::POLLOUT != 0 {
        Ok(Readiness::Ready)
    } else {
        Ok(Readiness::NotReady)
    }
}

fn poll_once(fd: RawFd, events: libc::c_short) -> io::Result<libc::c_short> {
    loop {
        let mut pfd = libc::pollfd {
            fd,
            events,
            revents: 0,
        };
        // SAFETY: `pfd` is a valid pollfd for the duration of the call and we
        // pass a count of exactly one entry with a zero timeout.
        let rc = unsafe { libc::poll(&mut pfd, 1, 0) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if rc == 0 {
            return Ok(0);
        }
        if pfd.revents & libc::POLLNVAL != 0 {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }
        return Ok(pfd.revents);
    }
}
