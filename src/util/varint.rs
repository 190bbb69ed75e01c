//! LEB128 variable-length integers.
//!
//! Used for length prefixes (doc keys, dictionary record counts) where the
//! word-aligned posting codec would waste space.

use crate::error::{Result, WordShardError};

/// Append `value` to `out`.
pub fn write_u64(out: &mut Vec<u8>, value: u64) {
    let mut val = value;
    loop {
        let byte = (val & 0x7F) as u8;
        val >>= 7;
        if val == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Number of bytes `write_u64` would produce for `value`.
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Decode a value starting at `*offset`, advancing the offset past it.
pub fn read_u64(buf: &[u8], offset: &mut usize) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0u32;
    let mut pos = *offset;

    loop {
        let Some(&byte) = buf.get(pos) else {
            return Err(WordShardError::corrupt(format!(
                "incomplete varint at offset {}",
                *offset
            )));
        };
        pos += 1;

        if shift >= 64 || (shift == 63 && byte & 0x7E != 0) {
            return Err(WordShardError::corrupt("varint overflow"));
        }
        result |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 == 0 {
            *offset = pos;
            return Ok(result);
        }
        shift += 7;
    }
}
