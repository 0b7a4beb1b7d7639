use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use bytes::{Buf, BytesMut};

use crate::error::{ChannelError, ChannelResult};
use crate::traits::Duplex;

/// In-process [`Duplex`] backed by a pair of queues.
///
/// Useful wherever a helper runs on a thread and real fds are not needed,
/// most of all in tests.
#[derive(Debug)]
pub struct MemoryDuplex {
    tx: Option<Sender<Vec<u8>>>,
    rx: Option<Receiver<Vec<u8>>>,
    pending: BytesMut,
}

impl MemoryDuplex {
    /// Two connected ends.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel();
        let (b_tx, a_rx) = mpsc::channel();
        (Self::new(a_tx, a_rx), Self::new(b_tx, b_rx))
    }

    fn new(tx: Sender<Vec<u8>>, rx: Receiver<Vec<u8>>) -> Self {
        Self {
            tx: Some(tx),
            rx: Some(rx),
            pending: BytesMut::new(),
        }
    }
}

impl Duplex for MemoryDuplex {
    fn read(&mut self, buf: &mut [u8]) -> ChannelResult<usize> {
        let rx = self.rx.as_ref().ok_or(ChannelError::Closed)?;
        if self.pending.is_empty() {
            match rx.try_recv() {
                Ok(chunk) => self.pending.extend_from_slice(&chunk),
                Err(TryRecvError::Empty) => return Ok(0),
                Err(TryRecvError::Disconnected) => return Err(ChannelError::Closed),
            }
        }
        let n = buf.len().min(self.pending.len());
        self.pending.copy_to_slice(&mut buf[..n]);
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> ChannelResult<usize> {
        let tx = self.tx.as_ref().ok_or(ChannelError::Closed)?;
        if data.is_empty() {
            return Ok(0);
        }
        tx.send(data.to_vec()).map_err(|_| ChannelError::Closed)?;
        Ok(data.len())
    }

    fn close(&mut self) {
        self.tx = None;
        self.rx = None;
        self.pending.clear();
    }
}
