/// Errors that can occur while building or validating frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame kind has no entry in the length table.
    #[error("invalid frame id 0x{0:02x}")]
    InvalidId(u8),

    /// The payload does not fit the declared length of its kind.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The stuffing window cannot be encoded with single-byte jumps.
    #[error("stuffing window of {len} bytes outside 2..=256")]
    StuffWindow { len: usize },

    /// The stuffing chain did not terminate at the end-of-frame byte.
    #[error("byte stuffing chain is corrupt")]
    CobsDecode,

    /// The frame was delimited correctly but its checksum does not match.
    #[error("crc mismatch (stored 0x{expected:04x}, computed 0x{actual:04x})")]
    CrcMismatch { expected: u16, actual: u16 },
}

pub type Result<T> = std::result::Result<T, FrameError>;
