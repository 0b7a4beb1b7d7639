use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use payloadlink_frame::Packet;
use tracing::debug;

use crate::error::{Result, SessionError};

/// Append-only record of every packet received from the peer.
///
/// One line per packet, `<unix-millis> <packet>`, flushed as it is written
/// so a crash loses at most the line in progress.
#[derive(Debug)]
pub struct BackupLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl BackupLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| SessionError::Backup {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), "backup log open");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn record(&mut self, packet: &Packet) -> Result<()> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        self.record_at(millis, packet)
    }

    fn record_at(&mut self, millis: u128, packet: &Packet) -> Result<()> {
        writeln!(self.writer, "{millis} {packet}")
            .and_then(|()| self.writer.flush())
            .map_err(|source| SessionError::Backup {
                path: self.path.clone(),
                source,
            })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
