//! In-place consistent overhead byte stuffing.
//!
//! The window starts with an overhead byte and ends with the terminator.
//! Every delimiter byte strictly inside the window is replaced by the
//! distance to the next delimiter, and the overhead byte holds the distance
//! to the first one. Afterwards the terminator is the only delimiter left,
//! and decoding walks the chain of distances back to it.

use crate::error::{FrameError, Result};

/// Largest window whose jumps all fit in one byte.
pub const MAX_WINDOW: usize = 256;

fn check_window(len: usize) -> Result<()> {
    if !(2..=MAX_WINDOW).contains(&len) {
        return Err(FrameError::StuffWindow { len });
    }
    Ok(())
}

/// Stuff `buf` in place.
///
/// `buf[0]` is overwritten with the first jump and `buf[len - 1]` is forced
/// to `delimiter`. The data being protected lives in `buf[1..len - 1]`.
pub fn stuff(buf: &mut [u8], delimiter: u8) -> Result<()> {
    check_window(buf.len())?;

    let last = buf.len() - 1;
    buf[last] = delimiter;

    // Distance from the current offset to the next delimiter.
    let mut jump: u8 = 1;
    for offset in (1..last).rev() {
        if buf[offset] == delimiter {
            buf[offset] = jump;
            jump = 1;
        } else {
            jump += 1;
        }
    }
    buf[0] = jump;
    Ok(())
}

/// Undo [`stuff`] in place.
///
/// On error the buffer is left partially decoded and must be discarded.
pub fn unstuff(buf: &mut [u8], delimiter: u8) -> Result<()> {
    check_window(buf.len()).map_err(|_| FrameError::CobsDecode)?;

    let last = buf.len() - 1;
    if buf[last] != delimiter {
        return Err(FrameError::CobsDecode);
    }

    let mut next = usize::from(buf[0]);
    while next < last {
        let jump = usize::from(buf[next]);
        if jump == 0 {
            return Err(FrameError::CobsDecode);
        }
        buf[next] = delimiter;
        next += jump;
    }

    if next != last {
        return Err(FrameError::CobsDecode);
    }
    Ok(())
}

/// Returns true if [`unstuff`] would succeed on `buf`, without modifying it.
pub fn verify_chain(buf: &[u8], delimiter: u8) -> bool {
    if check_window(buf.len()).is_err() {
        return false;
    }
    let last = buf.len() - 1;
    if buf[last] != delimiter {
        return false;
    }

    let mut next = usize::from(buf[0]);
    while next < last {
        let jump = usize::from(buf[next]);
        if jump == 0 {
            return false;
        }
        next += jump;
    }
    next == last
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stuff a copy of `interior` framed by an overhead byte and terminator,
    /// then unstuff it and compare the interior.
    fn roundtrip(interior: &[u8], delimiter: u8) -> Vec<u8> {
        let mut buf = Vec::with_capacity(interior.len() + 2);
        buf.push(0xEE);
        buf.extend_from_slice(interior);
        buf.push(0xEE);

        stuff(&mut buf, delimiter).unwrap();
        assert_eq!(buf[buf.len() - 1], delimiter);
        assert!(
            !buf[..buf.len() - 1].contains(&delimiter),
            "delimiter survived stuffing: {buf:?}"
        );
        assert!(verify_chain(&buf, delimiter));

        unstuff(&mut buf, delimiter).unwrap();
        buf[1..buf.len() - 1].to_vec()
    }

    #[test]
    fn roundtrip_all_zero() {
        let interior = [0u8; 21];
        assert_eq!(roundtrip(&interior, 0), interior);
    }

    #[test]
    fn roundtrip_no_zero() {
        let interior: Vec<u8> = (1..=21).collect();
        assert_eq!(roundtrip(&interior, 0), interior);
    }

    #[test]
    fn roundtrip_alternating_zero() {
        let interior: Vec<u8> = (0..21).map(|i| if i % 2 == 0 { 0 } else { 7 }).collect();
        assert_eq!(roundtrip(&interior, 0), interior);
    }

    #[test]
    fn roundtrip_every_length() {
        for len in 0..=(MAX_WINDOW - 2) {
            let interior: Vec<u8> = (0..len).map(|i| (i % 3) as u8).collect();
            assert_eq!(roundtrip(&interior, 0), interior, "interior length {len}");
        }
    }

    #[test]
    fn roundtrip_nonzero_delimiter() {
        let interior = [0x7E, 1, 2, 0x7E, 0x7E, 9];
        assert_eq!(roundtrip(&interior, 0x7E), interior);
    }

    #[test]
    fn minimal_window() {
        let mut buf = [0xAA, 0xBB];
        stuff(&mut buf, 0).unwrap();
        assert_eq!(buf, [1, 0]);
        unstuff(&mut buf, 0).unwrap();
    }

    #[test]
    fn known_encoding() {
        let mut buf = [0, 0x11, 0, 0x22, 0x33, 0, 0];
        stuff(&mut buf, 0).unwrap();
        assert_eq!(buf, [2, 0x11, 3, 0x22, 0x33, 1, 0]);
    }

    #[test]
    fn rejects_bad_window() {
        assert!(matches!(
            stuff(&mut [0u8; 1], 0),
            Err(FrameError::StuffWindow { len: 1 })
        ));
        assert!(matches!(
            stuff(&mut vec![0u8; MAX_WINDOW + 1], 0),
            Err(FrameError::StuffWindow { .. })
        ));
        assert!(matches!(unstuff(&mut [], 0), Err(FrameError::CobsDecode)));
    }

    #[test]
    fn rejects_missing_terminator() {
        let mut buf = [0, 1, 2, 3, 0];
        stuff(&mut buf, 0).unwrap();
        buf[4] = 9;
        assert!(matches!(unstuff(&mut buf, 0), Err(FrameError::CobsDecode)));
    }

    #[test]
    fn rejects_zero_jump() {
        let mut buf = [2, 5, 0, 5, 0];
        assert!(!verify_chain(&buf, 0));
        assert!(matches!(unstuff(&mut buf, 0), Err(FrameError::CobsDecode)));
    }

    #[test]
    fn single_byte_corruption_never_panics() {
        let mut original = [0u8; 23];
        for (i, b) in original.iter_mut().enumerate().skip(1) {
            *b = if i % 4 == 0 { 0 } else { i as u8 };
        }
        stuff(&mut original, 0).unwrap();

        for pos in 0..original.len() {
            for value in 0..=u8::MAX {
                let mut corrupted = original;
                corrupted[pos] = value;
                let verified = verify_chain(&corrupted, 0);
                let decoded = unstuff(&mut corrupted, 0).is_ok();
                assert_eq!(verified, decoded, "pos {pos} value {value}");
            }
        }
    }
}
