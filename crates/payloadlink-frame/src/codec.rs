use std::fmt;

use bytes::{Buf, BufMut};

use crate::cobs;
use crate::crc::{crc16, CRC_GENERATOR};
use crate::error::{FrameError, Result};
use crate::kind::{is_text, kind_name, length_for};

/// Total wire size of a frame.
pub const FRAME_SIZE: usize = 24;

/// Size of the payload field.
pub const PAYLOAD_SIZE: usize = 16;

/// Bytes covered by byte stuffing: overhead byte through end-of-frame.
pub const STUFF_WINDOW: usize = FRAME_SIZE - 1;

/// Value of the sync byte and the stuffing delimiter.
pub const SYNC: u8 = 0x00;

const OHB: usize = 1;
const ID: usize = 2;
const INDEX: usize = 3;
const PAYLOAD: usize = 5;
const CHECKSUM: usize = PAYLOAD + PAYLOAD_SIZE;
const EOP: usize = CHECKSUM + 2;

/// Bytes covered by the checksum: id, index and payload.
const CRC_SPAN: std::ops::Range<usize> = ID..CHECKSUM;

/// A 24-byte frame as it travels on the wire.
///
/// Layout:
/// ```text
/// ┌──────┬─────┬────┬─────────┬──────────────┬──────────┬─────┐
/// │ sync │ ohb │ id │ index   │ payload      │ checksum │ eop │
/// │ 0x00 │ (1) │(1) │ (2B LE) │ (16B)        │ (2B LE)  │0x00 │
/// └──────┴─────┴────┴─────────┴──────────────┴──────────┴─────┘
/// ```
///
/// Fields other than sync are only meaningful once the frame has been
/// unstuffed; use [`unpack`] to get at them.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    raw: [u8; FRAME_SIZE],
}

impl Frame {
    /// Wrap raw wire bytes without validating them.
    pub fn from_bytes(raw: [u8; FRAME_SIZE]) -> Self {
        Self { raw }
    }

    /// Copy a frame out of a slice of exactly [`FRAME_SIZE`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; FRAME_SIZE] = bytes.try_into().ok()?;
        Some(Self { raw })
    }

    /// Wire bytes.
    pub fn as_bytes(&self) -> &[u8; FRAME_SIZE] {
        &self.raw
    }

    pub fn sync(&self) -> u8 {
        self.raw[0]
    }

    pub fn overhead(&self) -> u8 {
        self.raw[OHB]
    }

    pub fn id(&self) -> u8 {
        self.raw[ID]
    }

    pub fn index(&self) -> u16 {
        (&self.raw[INDEX..PAYLOAD]).get_u16_le()
    }

    pub fn payload(&self) -> &[u8] {
        &self.raw[PAYLOAD..CHECKSUM]
    }

    pub fn checksum(&self) -> u16 {
        (&self.raw[CHECKSUM..EOP]).get_u16_le()
    }

    pub fn end_of_frame(&self) -> u8 {
        self.raw[EOP]
    }

    /// Lowercase hex rendering of the wire bytes.
    pub fn to_hex(&self) -> String {
        hex(&self.raw)
    }

    /// Parse 48 hex digits (whitespace ignored) into a frame.
    pub fn from_hex(input: &str) -> Option<Self> {
        let digits: Vec<u8> = input
            .bytes()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        if digits.len() != FRAME_SIZE * 2 {
            return None;
        }
        let mut raw = [0u8; FRAME_SIZE];
        for (slot, pair) in raw.iter_mut().zip(digits.chunks_exact(2)) {
            let pair = std::str::from_utf8(pair).ok()?;
            *slot = u8::from_str_radix(pair, 16).ok()?;
        }
        Some(Self { raw })
    }

    fn stuff_window_mut(&mut self) -> &mut [u8] {
        &mut self.raw[OHB..]
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("raw", &format_args!("{}", hex(&self.raw)))
            .finish()
    }
}

/// A validated, unstuffed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub id: u8,
    pub index: u16,
    pub payload: [u8; PAYLOAD_SIZE],
}

impl Packet {
    /// Payload trimmed to the declared length of its kind.
    pub fn data(&self) -> &[u8] {
        let len = length_for(self.id).map_or(PAYLOAD_SIZE, usize::from);
        &self.payload[..len]
    }

    /// Text payload with trailing NULs removed, for message/status kinds.
    pub fn text(&self) -> Option<String> {
        if !is_text(self.id) {
            return None;
        }
        let data = self.data();
        let end = data.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
        Some(String::from_utf8_lossy(&data[..end]).into_owned())
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id=0x{:02x} ({}) index={} data=",
            self.id,
            kind_name(self.id),
            self.index
        )?;
        match self.text() {
            Some(text) => write!(f, "{text:?}"),
            None => {
                let values: Vec<String> = self.data().iter().map(|b| b.to_string()).collect();
                write!(f, "[{}]", values.join(","))
            }
        }
    }
}

/// Build a stuffed frame.
///
/// Payloads shorter than the declared length of `id` are zero padded.
pub fn pack(id: u8, index: u16, payload: &[u8]) -> Result<Frame> {
    let declared = usize::from(length_for(id).ok_or(FrameError::InvalidId(id))?);
    if payload.len() > declared {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: declared,
        });
    }

    let mut raw = [0u8; FRAME_SIZE];
    raw[0] = SYNC;
    {
        let mut fields = &mut raw[ID..CHECKSUM];
        fields.put_u8(id);
        fields.put_u16_le(index);
        fields.put_slice(payload);
    }

    let checksum = crc16(&raw[CRC_SPAN], CRC_GENERATOR);
    (&mut raw[CHECKSUM..EOP]).put_u16_le(checksum);

    let mut frame = Frame { raw };
    cobs::stuff(frame.stuff_window_mut(), SYNC)?;
    Ok(frame)
}

/// Validate a frame and extract its fields.
pub fn unpack(frame: &Frame) -> Result<Packet> {
    let mut decoded = *frame;
    cobs::unstuff(decoded.stuff_window_mut(), SYNC)?;

    let stored = decoded.checksum();
    let computed = crc16(&decoded.raw[CRC_SPAN], CRC_GENERATOR);
    if stored != computed {
        return Err(FrameError::CrcMismatch {
            expected: stored,
            actual: computed,
        });
    }

    let mut payload = [0u8; PAYLOAD_SIZE];
    payload.copy_from_slice(decoded.payload());
    Ok(Packet {
        id: decoded.id(),
        index: decoded.index(),
        payload,
    })
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
