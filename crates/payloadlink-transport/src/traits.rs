use std::time::{Duration, Instant};

use payloadlink_frame::{Frame, FRAME_SIZE};
use tracing::warn;

use crate::error::{ChannelError, ChannelResult};

/// How long a frame may sit half transferred before the channel is given up
/// as [`ChannelError::Closed`].
pub const PARTIAL_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

const PARTIAL_FRAME_RETRY: Duration = Duration::from_micros(200);

/// A local, bidirectional, non-blocking byte channel.
///
/// `read` and `write` never block: `Ok(0)` means "nothing to do right now".
/// A peer that has gone away is reported as [`ChannelError::Closed`].
///
/// [`ChannelError::Closed`]: crate::ChannelError::Closed
pub trait Duplex {
    /// Read up to `buf.len()` bytes.
    fn read(&mut self, buf: &mut [u8]) -> ChannelResult<usize>;

    /// Write up to `data.len()` bytes.
    fn write(&mut self, data: &[u8]) -> ChannelResult<usize>;

    /// Release this side of the channel. Calling it twice is a no-op.
    fn close(&mut self);

    /// Send one whole frame.
    ///
    /// Returns `Ok(false)` when the channel is not writable. Once the first
    /// byte is accepted the rest of the frame is written before returning;
    /// a channel that takes none of it for [`PARTIAL_FRAME_TIMEOUT`] is
    /// [`ChannelError::Closed`].
    fn send_frame(&mut self, frame: &Frame) -> ChannelResult<bool> {
        let bytes = frame.as_bytes();
        let written = self.write(bytes)?;
        if written == 0 {
            return Ok(false);
        }
        finish_frame(written, |at| self.write(&bytes[at..]))?;
        Ok(true)
    }

    /// Receive one whole frame, or `Ok(None)` if none is pending.
    ///
    /// Frames on a local channel are always whole and aligned, so no
    /// resynchronization is attempted. A frame whose remainder does not
    /// arrive within [`PARTIAL_FRAME_TIMEOUT`] is [`ChannelError::Closed`].
    fn recv_frame(&mut self) -> ChannelResult<Option<Frame>> {
        let mut raw = [0u8; FRAME_SIZE];
        let filled = self.read(&mut raw)?;
        if filled == 0 {
            return Ok(None);
        }
        finish_frame(filled, |at| self.read(&mut raw[at..]))?;
        Ok(Some(Frame::from_bytes(raw)))
    }
}

/// Drive `transfer` from byte `done` to the end of a frame, sleeping briefly
/// whenever it makes no progress.
fn finish_frame<F>(mut done: usize, mut transfer: F) -> ChannelResult<()>
where
    F: FnMut(usize) -> ChannelResult<usize>,
{
    let deadline = Instant::now() + PARTIAL_FRAME_TIMEOUT;
    while done < FRAME_SIZE {
        match transfer(done)? {
            0 if Instant::now() >= deadline => {
                warn!(done, "channel stalled mid-frame, giving it up");
                return Err(ChannelError::Closed);
            }
            0 => std::thread::sleep(PARTIAL_FRAME_RETRY),
            n => done += n,
        }
    }
    Ok(())
}

impl<D: Duplex + ?Sized> Duplex for Box<D> {
    fn read(&mut self, buf: &mut [u8]) -> ChannelResult<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, data: &[u8]) -> ChannelResult<usize> {
        (**self).write(data)
    }

    fn close(&mut self) {
        (**self).close()
    }
}
