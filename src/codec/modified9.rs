//! Word-aligned selector codec for non-negative integers.
//!
//! Each codeword is a big-endian `u32`:
//!
//! ```text
//!  31      30..27      26..0
//! [last] [selector] [payload]
//! ```
//!
//! Selectors 0..=8 pack `count` values of `bits` bits each into the 27-bit
//! payload (see [`LAYOUTS`]). Values that do not fit 27 bits use one of the
//! wide selectors, which borrow whole extension words after the codeword.
//! The encoder never pads: it always chooses a layout whose count does not
//! exceed the values still to be written, so the `last` flag alone marks
//! the end of a sequence and sequences can be decoded back to back.

use crate::error::{Result, WordShardError};

/// `(count, bits)` for selectors 0..=8.
pub const LAYOUTS: [(usize, u32); 9] = [
    (27, 1),
    (13, 2),
    (9, 3),
    (6, 4),
    (5, 5),
    (4, 6),
    (3, 9),
    (2, 13),
    (1, 27),
];

const PAYLOAD_BITS: u32 = 27;
const PAYLOAD_MASK: u32 = (1 << PAYLOAD_BITS) - 1;
const LAST_FLAG: u32 = 1 << 31;
const SELECTOR_SHIFT: u32 = PAYLOAD_BITS;

/// One value below 2^59: payload holds the low 27 bits, one extension word the rest.
const SELECTOR_WIDE: u32 = 9;
/// Any `u64`: payload plus two extension words.
const SELECTOR_WIDEST: u32 = 10;
/// Terminal codeword of an empty sequence.
const SELECTOR_EMPTY: u32 = 15;

/// Size of one codeword in bytes.
pub const WORD_LEN: usize = 4;

/// Encode `values` into a new buffer.
pub fn encode_ints(values: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len().max(1) * WORD_LEN);
    encode_ints_into(values, &mut out);
    out
}

/// Append the encoding of `values` to `out`.
pub fn encode_ints_into(values: &[u64], out: &mut Vec<u8>) {
    if values.is_empty() {
        push_word(out, LAST_FLAG | (SELECTOR_EMPTY << SELECTOR_SHIFT));
        return;
    }

    let mut i = 0;
    while i < values.len() {
        let rest = &values[i..];
        let first = rest[0];

        if first > PAYLOAD_MASK as u64 {
            let last = if rest.len() == 1 { LAST_FLAG } else { 0 };
            let low = (first & PAYLOAD_MASK as u64) as u32;
            if first >> 59 == 0 {
                push_word(out, last | (SELECTOR_WIDE << SELECTOR_SHIFT) | low);
                push_word(out, (first >> PAYLOAD_BITS) as u32);
            } else {
                push_word(out, last | (SELECTOR_WIDEST << SELECTOR_SHIFT) | low);
                push_word(out, (first >> PAYLOAD_BITS) as u32);
                push_word(out, (first >> 59) as u32);
            }
            i += 1;
            continue;
        }

        // (1, 27) always fits here, so a layout is always found.
        let (selector, count, bits) = LAYOUTS
            .iter()
            .enumerate()
            .find(|(_, (count, bits))| {
                *count <= rest.len() && rest[..*count].iter().all(|&v| v >> bits == 0)
            })
            .map(|(s, &(count, bits))| (s as u32, count, bits))
            .unwrap_or((8, 1, PAYLOAD_BITS));

        let mut word = selector << SELECTOR_SHIFT;
        for (j, &v) in rest[..count].iter().enumerate() {
            word |= (v as u32) << (j as u32 * bits);
        }
        if count == rest.len() {
            word |= LAST_FLAG;
        }
        push_word(out, word);
        i += count;
    }
}

/// Decode one sequence starting at `*offset`.
///
/// On success the offset is advanced by exactly the number of bytes
/// consumed. On error it is left untouched.
pub fn decode_ints(buf: &[u8], offset: &mut usize) -> Result<Vec<u64>> {
    let mut values = Vec::new();
    decode_ints_into(buf, offset, &mut values)?;
    Ok(values)
}

/// Decode one sequence starting at `*offset`, appending to `values`.
///
/// On error neither `values` nor the offset change.
pub fn decode_ints_into(buf: &[u8], offset: &mut usize, values: &mut Vec<u64>) -> Result<()> {
    let start_len = values.len();
    match decode_sequence(buf, *offset, values) {
        Ok(end) => {
            *offset = end;
            Ok(())
        }
        Err(e) => {
            values.truncate(start_len);
            Err(e)
        }
    }
}

/// Returns the offset just past the sequence.
fn decode_sequence(buf: &[u8], start: usize, values: &mut Vec<u64>) -> Result<usize> {
    let start_len = values.len();
    let mut pos = start;

    loop {
        let word = read_word(buf, pos)?;
        pos += WORD_LEN;

        let last = word & LAST_FLAG != 0;
        let selector = (word >> SELECTOR_SHIFT) & 0xF;
        let payload = word & PAYLOAD_MASK;

        match selector {
            0..=8 => {
                let (count, bits) = LAYOUTS[selector as usize];
                let mask = (1u32 << bits) - 1;
                for j in 0..count as u32 {
                    values.push(((payload >> (j * bits)) & mask) as u64);
                }
            }
            SELECTOR_WIDE => {
                let high = read_word(buf, pos)?;
                pos += WORD_LEN;
                values.push(payload as u64 | ((high as u64) << PAYLOAD_BITS));
            }
            SELECTOR_WIDEST => {
                let mid = read_word(buf, pos)?;
                let top = read_word(buf, pos + WORD_LEN)?;
                pos += 2 * WORD_LEN;
                if top >> 5 != 0 {
                    return Err(WordShardError::corrupt("integer codeword exceeds 64 bits"));
                }
                values.push(
                    payload as u64 | ((mid as u64) << PAYLOAD_BITS) | ((top as u64) << 59),
                );
            }
            SELECTOR_EMPTY if last && values.len() == start_len => {}
            _ => {
                return Err(WordShardError::corrupt(format!(
                    "invalid codeword selector {selector} at offset {}",
                    pos - WORD_LEN
                )));
            }
        }

        if last {
            return Ok(pos);
        }
    }
}

fn push_word(out: &mut Vec<u8>, word: u32) {
    out.extend_from_slice(&word.to_be_bytes());
}

fn read_word(buf: &[u8], pos: usize) -> Result<u32> {
    buf.get(pos..pos + WORD_LEN)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| {
            WordShardError::corrupt(format!(
                "truncated integer codeword at offset {pos} (buffer length {})",
                buf.len()
            ))
        })
}
