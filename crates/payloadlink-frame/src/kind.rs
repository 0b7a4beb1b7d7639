//! Frame kind ids and their declared payload lengths.
//!
//! Ids with either of the two top bits set carry 16 bytes of ASCII text.
//! The remaining ids carry packed sensor samples whose length depends on the
//! channel count of the sensor that produced them.

/// Free-form message from Pi 1.
pub const MSG_PI1: u8 = 0b1001_0000;

/// Free-form message from Pi 2.
pub const MSG_PI2: u8 = 0b1010_0000;

/// Status report from Pi 1.
pub const STATUS_PI1: u8 = 0b0101_0000;

/// Status report from Pi 2.
pub const STATUS_PI2: u8 = 0b0110_0000;

/// Accelerometer/gyroscope samples from the Pi 1 IMU.
pub const DATA_PI1_ACC_GYR: u8 = 0b0001_0000;

/// Magnetometer samples and timestamp from the Pi 1 IMU.
pub const DATA_PI1_MAG_TIME: u8 = 0b0001_0001;

/// Accelerometer/gyroscope samples from the Pi 2 IMU.
pub const DATA_PI2_ACC_GYR: u8 = 0b0010_0000;

/// Magnetometer, impedance and timestamp samples from Pi 2.
pub const DATA_PI2_MAG_IMP_TIME: u8 = 0b0010_0010;

/// Every id with an entry in the length table.
pub const KNOWN_KINDS: [u8; 8] = [
    MSG_PI1,
    MSG_PI2,
    STATUS_PI1,
    STATUS_PI2,
    DATA_PI1_ACC_GYR,
    DATA_PI1_MAG_TIME,
    DATA_PI2_ACC_GYR,
    DATA_PI2_MAG_IMP_TIME,
];

const TEXT_LEN: u8 = 16;

/// Declared payload length for a frame id, `None` for unknown ids.
pub fn length_for(id: u8) -> Option<u8> {
    match id {
        MSG_PI1 | MSG_PI2 | STATUS_PI1 | STATUS_PI2 => Some(TEXT_LEN),
        DATA_PI1_ACC_GYR | DATA_PI2_ACC_GYR | DATA_PI2_MAG_IMP_TIME => Some(12),
        DATA_PI1_MAG_TIME => Some(10),
        _ => None,
    }
}

/// Returns a human-readable name for a frame id.
pub fn kind_name(id: u8) -> &'static str {
    match id {
        MSG_PI1 => "MSG_PI1",
        MSG_PI2 => "MSG_PI2",
        STATUS_PI1 => "STATUS_PI1",
        STATUS_PI2 => "STATUS_PI2",
        DATA_PI1_ACC_GYR => "DATA_PI1_ACC_GYR",
        DATA_PI1_MAG_TIME => "DATA_PI1_MAG_TIME",
        DATA_PI2_ACC_GYR => "DATA_PI2_ACC_GYR",
        DATA_PI2_MAG_IMP_TIME => "DATA_PI2_MAG_IMP_TIME",
        _ => "UNKNOWN",
    }
}

/// Returns true for message and status kinds.
pub fn is_text(id: u8) -> bool {
    length_for(id).is_some() && id & 0b1100_0000 != 0
}

/// Returns true for sensor sample kinds.
pub fn is_measurement(id: u8) -> bool {
    length_for(id).is_some() && id & 0b1100_0000 == 0
}
