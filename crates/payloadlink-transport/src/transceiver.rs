use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;

use bytes::{Buf, BytesMut};
use payloadlink_frame::{Frame, ResyncStats, Resynchronizer, FRAME_SIZE};
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::poll::{poll_read, poll_write, Readiness};

/// Frame-level send/receive over a raw byte stream (TCP socket, serial
/// port, pipe).
///
/// Every call first polls the fd with a zero timeout, so nothing here
/// blocks waiting for the peer.
#[derive(Debug)]
pub struct Transceiver<T> {
    io: T,
    resync: Resynchronizer,
    /// Bytes read past the end of the last returned frame.
    inbox: BytesMut,
    /// Unsent tail of a frame the stream only partly accepted.
    outbox: BytesMut,
}

impl<T: Read + Write + AsRawFd> Transceiver<T> {
    pub fn new(io: T) -> Self {
        Self {
            io,
            resync: Resynchronizer::new(),
            inbox: BytesMut::with_capacity(FRAME_SIZE),
            outbox: BytesMut::with_capacity(FRAME_SIZE),
        }
    }

    /// Read whatever raw bytes are available, up to `buf.len()`.
    ///
    /// Returns 0 when nothing is readable; end of stream is
    /// [`TransportError::Hangup`].
    pub fn recv_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match poll_read(self.io.as_raw_fd())? {
            Readiness::NotReady => return Ok(0),
            Readiness::HangUp => return Err(TransportError::Hangup),
            Readiness::Ready => {}
        }
        match self.io.read(buf) {
            Ok(0) => Err(TransportError::Hangup),
            Ok(n) => {
                trace!(n, "received raw bytes");
                Ok(n)
            }
            Err(e) if is_transient(&e) => Ok(0),
            Err(e) if is_disconnect(&e) => Err(TransportError::Hangup),
            Err(e) => Err(e.into()),
        }
    }

    /// Write as much of `data` as the stream accepts right now.
    ///
    /// Returns 0 when the stream is not writable or reports a hangup.
    pub fn send_bytes(&mut self, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        match poll_write(self.io.as_raw_fd())? {
            Readiness::NotReady => return Ok(0),
            Readiness::HangUp => {
                debug!("stream reports hangup on write");
                return Ok(0);
            }
            Readiness::Ready => {}
        }
        match self.io.write(data) {
            Ok(n) => Ok(n),
            Err(e) if is_transient(&e) => Ok(0),
            Err(e) if is_disconnect(&e) => Err(TransportError::Hangup),
            Err(e) => Err(e.into()),
        }
    }

    /// Return the next complete frame, or `None` if the bytes available so
    /// far do not finish one.
    ///
    /// Bytes that arrive after a frame in the same read are kept for the
    /// next call.
    pub fn recv_packet(&mut self) -> Result<Option<Frame>> {
        while self.inbox.has_remaining() {
            if let Some(frame) = self.resync.push_byte(self.inbox.get_u8()) {
                return Ok(Some(frame));
            }
        }

        let mut chunk = [0u8; FRAME_SIZE];
        loop {
            let n = self.recv_bytes(&mut chunk)?;
            if n == 0 {
                return Ok(None);
            }
            for (i, &byte) in chunk[..n].iter().enumerate() {
                if let Some(frame) = self.resync.push_byte(byte) {
                    self.inbox.extend_from_slice(&chunk[i + 1..n]);
                    return Ok(Some(frame));
                }
            }
        }
    }

    /// Send one frame.
    ///
    /// Returns 0 if the stream is not writable, or if the tail of an
    /// earlier frame is still waiting to go out. Otherwise the frame is
    /// accepted and `FRAME_SIZE` is returned, even when the stream only
    /// took part of it: the rest is kept and sent by later calls to
    /// `send_packet` or [`flush`](Self::flush).
    pub fn send_packet(&mut self, frame: &Frame) -> Result<usize> {
        if !self.flush()? {
            return Ok(0);
        }
        let bytes = frame.as_bytes();
        let written = self.send_bytes(bytes)?;
        if written == 0 {
            return Ok(0);
        }
        if written < FRAME_SIZE {
            trace!(written, "frame partly sent, queueing the rest");
            self.outbox.extend_from_slice(&bytes[written..]);
        }
        trace!(id = frame.id(), "sent frame");
        Ok(FRAME_SIZE)
    }

    /// Push out the queued tail of a partly sent frame.
    ///
    /// Returns `true` once nothing is pending. A peer that hangs up while
    /// part of a frame is still queued is [`TransportError::Hangup`].
    pub fn flush(&mut self) -> Result<bool> {
        while !self.outbox.is_empty() {
            match poll_write(self.io.as_raw_fd())? {
                Readiness::HangUp => return Err(TransportError::Hangup),
                Readiness::NotReady => return Ok(false),
                Readiness::Ready => {}
            }
            let pending = std::mem::take(&mut self.outbox);
            let sent = self.send_bytes(&pending);
            self.outbox = pending;
            match sent? {
                0 => return Ok(false),
                n => self.outbox.advance(n),
            }
        }
        Ok(true)
    }

    /// Bytes of a partly sent frame still waiting for the stream.
    pub fn pending_out(&self) -> usize {
        self.outbox.len()
    }

    pub fn stats(&self) -> ResyncStats {
        self.resync.stats()
    }

    pub fn get_ref(&self) -> &T {
        &self.io
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.io
    }

    pub fn into_inner(self) -> T {
        self.io
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;

    use super::*;
    use payloadlink_frame::{pack, unpack, DATA_PI2_MAG_IMP_TIME, MSG_PI1, MSG_PI2};

    fn pair() -> (Transceiver<UnixStream>, UnixStream) {
        let (left, right) = UnixStream::pair().unwrap();
        left.set_nonblocking(true).unwrap();
        (Transceiver::new(left), right)
    }

    #[test]
    fn nothing_available_is_not_an_error() {
        let (mut trx, _peer) = pair();
        assert_eq!(trx.recv_bytes(&mut [0u8; 8]).unwrap(), 0);
        assert_eq!(trx.recv_packet().unwrap(), None);
    }

    #[test]
    fn recv_packet_returns_frames_one_at_a_time() {
        let (mut trx, mut peer) = pair();
        let first = pack(MSG_PI1, 1, b"one").unwrap();
        let second = pack(MSG_PI2, 2, b"two").unwrap();
        peer.write_all(first.as_bytes()).unwrap();
        peer.write_all(second.as_bytes()).unwrap();

        assert_eq!(trx.recv_packet().unwrap(), Some(first));
        assert_eq!(trx.recv_packet().unwrap(), Some(second));
        assert_eq!(trx.recv_packet().unwrap(), None);
    }

    #[test]
    fn frame_split_across_reads() {
        let (mut trx, mut peer) = pair();
        let frame = pack(DATA_PI2_MAG_IMP_TIME, 9, &[3u8; 12]).unwrap();

        peer.write_all(&frame.as_bytes()[..7]).unwrap();
        assert_eq!(trx.recv_packet().unwrap(), None);
        peer.write_all(&frame.as_bytes()[7..]).unwrap();
        assert_eq!(trx.recv_packet().unwrap(), Some(frame));
    }

    #[test]
    fn leading_garbage_is_skipped() {
        let (mut trx, mut peer) = pair();
        peer.write_all(&[0xFF, 0x12, 0x00, 0x34]).unwrap();
        let frame = pack(MSG_PI1, 5, b"clean").unwrap();
        peer.write_all(frame.as_bytes()).unwrap();

        assert_eq!(trx.recv_packet().unwrap(), Some(frame));
        assert!(trx.stats().discarded_bytes >= 3);
    }

    #[test]
    fn send_packet_writes_whole_frame() {
        let (mut trx, mut peer) = pair();
        let frame = pack(MSG_PI2, 300, b"to ground").unwrap();
        assert_eq!(trx.send_packet(&frame).unwrap(), FRAME_SIZE);

        let mut raw = [0u8; FRAME_SIZE];
        peer.read_exact(&mut raw).unwrap();
        assert_eq!(unpack(&Frame::from_bytes(raw)).unwrap().index, 300);
    }

    /// Writes go to `sent`, at most `budget` bytes in total; readiness
    /// comes from a live socket so polling reports writable.
    struct Trickle {
        sock: UnixStream,
        budget: usize,
        sent: Vec<u8>,
    }

    impl Read for Trickle {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::ErrorKind::WouldBlock.into())
        }
    }

    impl Write for Trickle {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = data.len().min(self.budget);
            self.budget -= n;
            self.sent.extend_from_slice(&data[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl AsRawFd for Trickle {
        fn as_raw_fd(&self) -> std::os::fd::RawFd {
            self.sock.as_raw_fd()
        }
    }

    #[test]
    fn partly_sent_frame_is_finished_later_without_waiting() {
        let (sock, _peer) = UnixStream::pair().unwrap();
        let mut trx = Transceiver::new(Trickle {
            sock,
            budget: 10,
            sent: Vec::new(),
        });

        let first = pack(MSG_PI1, 1, b"first").unwrap();
        assert_eq!(trx.send_packet(&first).unwrap(), FRAME_SIZE);
        assert_eq!(trx.pending_out(), FRAME_SIZE - 10);

        // The stalled tail blocks the next frame instead of the caller.
        let second = pack(MSG_PI2, 2, b"second").unwrap();
        assert_eq!(trx.send_packet(&second).unwrap(), 0);
        assert!(!trx.flush().unwrap());

        trx.get_mut().budget = usize::MAX;
        assert!(trx.flush().unwrap());
        assert_eq!(trx.pending_out(), 0);
        assert_eq!(trx.send_packet(&second).unwrap(), FRAME_SIZE);

        let expected = [first.as_bytes().as_slice(), second.as_bytes().as_slice()].concat();
        assert_eq!(trx.get_ref().sent, expected);
    }

    #[test]
    fn closed_peer_is_hangup() {
        let (mut trx, peer) = pair();
        drop(peer);
        assert!(matches!(
            trx.recv_packet(),
            Err(TransportError::Hangup)
        ));
    }

    #[test]
    fn buffered_frame_survives_peer_close() {
        let (mut trx, mut peer) = pair();
        let frame = pack(MSG_PI1, 1, b"last").unwrap();
        peer.write_all(frame.as_bytes()).unwrap();
        drop(peer);

        assert_eq!(trx.recv_packet().unwrap(), Some(frame));
        assert!(matches!(trx.recv_packet(), Err(TransportError::Hangup)));
    }

    #[test]
    fn send_to_closed_peer_is_not_a_panic() {
        let (mut trx, peer) = pair();
        drop(peer);
        let frame = pack(MSG_PI1, 1, b"x").unwrap();
        match trx.send_packet(&frame) {
            Ok(0) | Err(TransportError::Hangup) => {}
            other => panic!("unexpected send result: {other:?}"),
        }
    }
}
