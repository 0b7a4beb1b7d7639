use std::path::PathBuf;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Network or serial transport error.
    #[error("transport error: {0}")]
    Transport(#[from] payloadlink_transport::TransportError),

    /// Local channel error.
    #[error("channel error: {0}")]
    Channel(#[from] payloadlink_transport::ChannelError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] payloadlink_frame::FrameError),

    /// The session has no connected socket.
    #[error("session is not connected")]
    NotConnected,

    /// The remote side went away.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// The backup log could not be opened or written.
    #[error("backup log {}: {source}", .path.display())]
    Backup {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Gave up waiting for the peer.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The bridge helper could not be stopped cleanly.
    #[error("shutdown failed: {0}")]
    ShutdownFailed(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;

impl SessionError {
    /// True when the local channel to the bridge is gone, which is how an
    /// owner learns that the bridge has exited.
    pub fn is_channel_closed(&self) -> bool {
        matches!(
            self,
            Self::Channel(payloadlink_transport::ChannelError::Closed)
        )
    }
}
