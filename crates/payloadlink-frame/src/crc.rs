//! CRC16 used by the frame checksum.

/// Generator polynomial for frame checksums (x^16 term implied).
pub const CRC_GENERATOR: u16 = 0x724E;

/// CRC-16/BUYPASS generator.
pub const CRC16_GEN_BUYPASS: u16 = 0x8005;
/// CRC-16/XMODEM generator.
pub const CRC16_GEN_XMODEM: u16 = 0x1021;
/// CRC-16/DECT-X generator.
pub const CRC16_GEN_DECT_X: u16 = 0x0589;
/// CRC-16/T10-DIF generator.
pub const CRC16_GEN_T10_DIF: u16 = 0x8BB7;

/// Compute the frame CRC16 of `bytes`.
///
/// Initial value 0, MSB first, no reflection, no final XOR. Each byte is
/// XORed into the low byte of the register before its eight shifts, and one
/// extra round of eight shifts runs after the last byte. That trailing round
/// makes this differ from every catalogued CRC-16 even with a standard
/// generator, so do not substitute a table-driven implementation.
pub fn crc16(bytes: &[u8], generator: u16) -> u16 {
    let mut checksum: u16 = 0;
    for &byte in bytes {
        checksum ^= u16::from(byte);
        checksum = shift_round(checksum, generator);
    }
    shift_round(checksum, generator)
}

fn shift_round(mut checksum: u16, generator: u16) -> u16 {
    for _ in 0..8 {
        checksum = if checksum & 0x8000 != 0 {
            (checksum << 1) ^ generator
        } else {
            checksum << 1
        };
    }
    checksum
}
