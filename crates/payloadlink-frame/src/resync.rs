use tracing::trace;

use crate::cobs::verify_chain;
use crate::codec::{Frame, FRAME_SIZE, SYNC};

/// Counters describing what the resynchronizer has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResyncStats {
    /// Candidate frames handed out.
    pub frames: u64,
    /// Candidates dropped for bad length or a broken stuffing chain.
    pub framing_errors: u64,
    /// Bytes dropped while hunting for sync or with a rejected candidate.
    pub discarded_bytes: u64,
}

/// Recovers frame boundaries from an unaligned byte stream.
///
/// Bytes are pushed one at a time. A zero byte at the start of the scratch
/// buffer is the sync byte; the next zero terminates the candidate. Only a
/// candidate of exactly [`FRAME_SIZE`] bytes whose stuffing chain checks out
/// is returned. Anything else is dropped, and a terminating zero that did
/// not close a valid frame is reused as the sync byte of the next candidate,
/// so a frame that directly follows garbage is still recovered.
///
/// The checksum is not verified here; feed returned frames to
/// [`unpack`](crate::unpack).
#[derive(Debug, Clone)]
pub struct Resynchronizer {
    buf: [u8; FRAME_SIZE],
    cursor: usize,
    stats: ResyncStats,
}

impl Default for Resynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Resynchronizer {
    pub fn new() -> Self {
        Self {
            buf: [0u8; FRAME_SIZE],
            cursor: 0,
            stats: ResyncStats::default(),
        }
    }

    /// Push one byte, returning a frame if it completed one.
    pub fn push_byte(&mut self, byte: u8) -> Option<Frame> {
        if self.cursor == 0 && byte != SYNC {
            self.stats.discarded_bytes += 1;
            return None;
        }

        self.buf[self.cursor] = byte;
        self.cursor += 1;

        if byte == SYNC && self.cursor > 1 {
            if self.cursor == FRAME_SIZE && verify_chain(&self.buf[1..], SYNC) {
                self.cursor = 0;
                self.stats.frames += 1;
                return Some(Frame::from_bytes(self.buf));
            }
            self.reject(self.cursor - 1);
            // The terminator may be the sync byte of the frame that follows.
            self.buf[0] = SYNC;
            self.cursor = 1;
            return None;
        }

        if self.cursor == FRAME_SIZE {
            self.reject(FRAME_SIZE);
            self.cursor = 0;
        }
        None
    }

    /// Push a run of bytes, collecting every completed frame.
    pub fn push_slice(&mut self, bytes: &[u8]) -> Vec<Frame> {
        bytes.iter().filter_map(|&b| self.push_byte(b)).collect()
    }

    /// Drop any partial candidate.
    pub fn reset(&mut self) {
        if self.cursor > 0 {
            self.stats.discarded_bytes += self.cursor as u64;
        }
        self.cursor = 0;
    }

    /// Number of bytes in the current partial candidate.
    pub fn pending(&self) -> usize {
        self.cursor
    }

    pub fn stats(&self) -> ResyncStats {
        self.stats
    }

    fn reject(&mut self, dropped: usize) {
        self.stats.framing_errors += 1;
        self.stats.discarded_bytes += dropped as u64;
        trace!(dropped, "resynchronizer rejected candidate");
    }
}
