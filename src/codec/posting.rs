//! (document index, position list) packing on top of [`modified9`](super::modified9).

use crate::codec::modified9::{decode_ints, encode_ints_into};
use crate::error::{Result, WordShardError};

/// Encode a doc index and a strictly ascending position list.
///
/// The position list is delta coded: first value absolute, each following
/// value as the gap from its predecessor. Small gaps pack many to a word,
/// a large first gap simply selects a wider layout for that codeword.
pub fn pack_posting(doc_index: u64, positions: &[u64]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    pack_posting_into(doc_index, positions, &mut out)?;
    Ok(out)
}

/// Append a packed posting to `out`.
pub fn pack_posting_into(doc_index: u64, positions: &[u64], out: &mut Vec<u8>) -> Result<()> {
    let mut ints = Vec::with_capacity(positions.len() + 1);
    ints.push(doc_index);

    let mut prev: Option<u64> = None;
    for &pos in positions {
        let gap = match prev {
            None => pos,
            Some(p) if pos > p => pos - p,
            Some(p) => {
                return Err(WordShardError::invalid_argument(format!(
                    "positions must be strictly ascending: {pos} follows {p}"
                )));
            }
        };
        ints.push(gap);
        prev = Some(pos);
    }

    encode_ints_into(&ints, out);
    Ok(())
}

/// Decode a posting written by [`pack_posting`] starting at `*offset`.
///
/// When `with_index` is false the stored doc index is skipped and `0` is
/// returned in its place. The offset advances by the encoded length.
pub fn unpack_posting(buf: &[u8], offset: &mut usize, with_index: bool) -> Result<(u64, Vec<u64>)> {
    let start = *offset;
    let ints = decode_ints(buf, offset)?;

    let Some((&doc_index, gaps)) = ints.split_first() else {
        *offset = start;
        return Err(WordShardError::corrupt(format!(
            "posting at offset {start} has no document index"
        )));
    };

    let mut positions = Vec::with_capacity(gaps.len());
    let mut current = 0u64;
    for (i, &gap) in gaps.iter().enumerate() {
        current = if i == 0 {
            gap
        } else {
            match current.checked_add(gap) {
                Some(next) if gap > 0 => next,
                _ => {
                    *offset = start;
                    return Err(WordShardError::corrupt(format!(
                        "invalid position gap {gap} in posting at offset {start}"
                    )));
                }
            }
        };
        positions.push(current);
    }

    let doc_index = if with_index { doc_index } else { 0 };
    Ok((doc_index, positions))
}
