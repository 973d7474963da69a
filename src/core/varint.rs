//! Portable-storage variable length integers.
//!
//! The value is shifted left by two bits and the low two bits carry the
//! width of the encoding:
//!
//! ```text
//! 00 -> 1 byte   (value <= 63)
//! 01 -> 2 bytes  (value <= 16383)
//! 10 -> 4 bytes  (value <= 1073741823)
//! 11 -> 8 bytes  (value <= 2^62 - 1)
//! ```
//!
//! All widths are little-endian.

use crate::error::{constants, ProtocolError, Result};
use bytes::BufMut;

/// Largest value representable in one byte
pub const MAX_ONE_BYTE: u64 = 63;
/// Largest value representable in two bytes
pub const MAX_TWO_BYTES: u64 = 16_383;
/// Largest value representable in four bytes
pub const MAX_FOUR_BYTES: u64 = 1_073_741_823;
/// Largest value representable at all
pub const MAX_VARINT: u64 = (1 << 62) - 1;

const MARK_ONE: u64 = 0b00;
const MARK_TWO: u64 = 0b01;
const MARK_FOUR: u64 = 0b10;
const MARK_EIGHT: u64 = 0b11;

/// Number of bytes `value` occupies once encoded
pub fn encoded_len(value: u64) -> Result<usize> {
    if value <= MAX_ONE_BYTE {
        Ok(1)
    } else if value <= MAX_TWO_BYTES {
        Ok(2)
    } else if value <= MAX_FOUR_BYTES {
        Ok(4)
    } else if value <= MAX_VARINT {
        Ok(8)
    } else {
        Err(ProtocolError::format(constants::ERR_VARINT_RANGE))
    }
}

/// Append `value` to `out` using the smallest size class that holds it
pub fn write<B: BufMut>(out: &mut B, value: u64) -> Result<()> {
    match encoded_len(value)? {
        1 => out.put_u8(((value << 2) | MARK_ONE) as u8),
        2 => out.put_u16_le(((value << 2) | MARK_TWO) as u16),
        4 => out.put_u32_le(((value << 2) | MARK_FOUR) as u32),
        _ => out.put_u64_le((value << 2) | MARK_EIGHT),
    }
    Ok(())
}

/// Read a varint from the front of `input`.
///
/// Returns the value and the number of bytes consumed. Never reads past the
/// width announced by the size marker.
pub fn read(input: &[u8]) -> Result<(u64, usize)> {
    let first = *input.first().ok_or(ProtocolError::Bounds {
        needed: 1,
        remaining: 0,
    })?;

    let width = match u64::from(first) & 0b11 {
        MARK_ONE => 1,
        MARK_TWO => 2,
        MARK_FOUR => 4,
        _ => 8,
    };

    if input.len() < width {
        return Err(ProtocolError::Bounds {
            needed: width,
            remaining: input.len(),
        });
    }

    let mut raw = [0u8; 8];
    raw[..width].copy_from_slice(&input[..width]);
    Ok((u64::from_le_bytes(raw) >> 2, width))
}
