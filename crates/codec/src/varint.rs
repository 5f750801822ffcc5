//! Unsigned LEB128-style varints
//!
//! Each byte carries 7 bits of the value, least-significant group first.
//! The high bit is set on every byte except the last.
//!
//! ```text
//! 300 = 0b1_0010_1100 -> [0xAC, 0x02]
//! ```

use crate::error::{CodecError, CodecResult};

/// Maximum number of groups a `u64` can occupy
pub const MAX_VARINT_LEN: usize = 10;

/// Encode `value` into a fresh buffer
pub fn encode(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(value));
    encode_into(&mut out, value);
    out
}

/// Append the encoding of `value` to `out`
pub fn encode_into(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Number of bytes `encode(value)` produces
pub fn encoded_len(value: u64) -> usize {
    let mut len = 1;
    let mut v = value >> 7;
    while v != 0 {
        len += 1;
        v >>= 7;
    }
    len
}

/// Decode a varint starting at `offset`
///
/// Returns the value and the offset just past it. Fails with
/// `MalformedVarint` if the input ends mid-sequence, if ten groups pass
/// without a terminating byte, or if the tenth group overflows 64 bits.
pub fn decode(bytes: &[u8], offset: usize) -> CodecResult<(u64, usize)> {
    let malformed = || CodecError::MalformedVarint { offset };

    let mut value: u64 = 0;
    let mut pos = offset;
    for group in 0..MAX_VARINT_LEN {
        let byte = *bytes.get(pos).ok_or_else(malformed)?;
        pos += 1;

        let bits = u64::from(byte & 0x7f);
        // Only the lowest bit of the tenth group fits in a u64
        if group == MAX_VARINT_LEN - 1 && bits > 1 {
            return Err(malformed());
        }
        value |= bits << (7 * group);

        if byte & 0x80 == 0 {
            return Ok((value, pos));
        }
    }

    Err(malformed())
}
