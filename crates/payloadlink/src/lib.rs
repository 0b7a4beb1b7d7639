//! Telemetry link for a two-computer rocket payload.
//!
//! Both computers exchange fixed 24-byte frames over TCP, and either one can
//! also talk to the ground station through a radio modem on a serial port.
//!
//! # Crate Structure
//!
//! - [`frame`]: frame layout, CRC16, byte stuffing, stream resynchronization
//! - [`transport`]: non-blocking pipes, forked helpers, TCP, serial, transceiver
//! - [`session`]: client/server sessions and the bridge helper (behind `session` feature)

/// Re-export frame types.
pub mod frame {
    pub use payloadlink_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use payloadlink_transport::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use payloadlink_session::*;
}
