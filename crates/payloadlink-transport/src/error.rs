use std::path::PathBuf;

/// Errors that can occur on a network or serial byte stream.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind the listening socket.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to the remote end.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// The host name did not resolve to an IPv4 address.
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote end closed the stream.
    #[error("remote end hung up")]
    Hangup,

    /// The requested baud rate is not in the supported set.
    #[error("unsupported baud rate {0} (supported: 9600, 19200, 38400, 57600, 115200, 230400)")]
    UnsupportedBaud(u32),

    /// The serial device could not be opened or configured.
    #[error("serial device {}: {source}", .path.display())]
    Serial {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Errors on a local duplex channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The channel has not been assigned a role yet.
    #[error("channel used before fork")]
    NotForked,

    /// The channel already has a role.
    #[error("channel already forked")]
    AlreadyForked,

    /// The other side of the channel is gone.
    #[error("channel closed by peer")]
    Closed,

    /// `fork(2)` failed.
    #[error("fork failed: {0}")]
    Fork(std::io::Error),

    /// Any other OS error on the channel fds.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;

pub type ChannelResult<T> = std::result::Result<T, ChannelError>;
