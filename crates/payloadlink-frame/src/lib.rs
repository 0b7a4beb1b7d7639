//! Fixed-layout telemetry frames for the payload link.
//!
//! Every frame on the wire is exactly [`FRAME_SIZE`] bytes:
//! - a literal `0x00` sync byte
//! - a byte-stuffing overhead byte
//! - kind id, little-endian index, 16-byte payload
//! - a CRC16 over id/index/payload
//! - a literal `0x00` end-of-frame byte
//!
//! Stuffing guarantees that sync and end-of-frame are the only zero bytes in
//! a frame, which is what lets [`Resynchronizer`] find frame boundaries in an
//! unaligned byte stream.

pub mod cobs;
pub mod codec;
pub mod crc;
pub mod error;
pub mod kind;
pub mod resync;

#[cfg(feature = "async")]
pub mod async_codec;

pub use cobs::{stuff, unstuff, verify_chain};
pub use codec::{pack, unpack, Frame, Packet, FRAME_SIZE, PAYLOAD_SIZE, STUFF_WINDOW};
pub use crc::{crc16, CRC_GENERATOR};
pub use error::{FrameError, Result};
pub use kind::{
    is_measurement, is_text, kind_name, length_for, DATA_PI1_ACC_GYR, DATA_PI1_MAG_TIME,
    DATA_PI2_ACC_GYR, DATA_PI2_MAG_IMP_TIME, KNOWN_KINDS, MSG_PI1, MSG_PI2, STATUS_PI1,
    STATUS_PI2,
};
pub use resync::{ResyncStats, Resynchronizer};

#[cfg(feature = "async")]
pub use async_codec::PacketCodec;
