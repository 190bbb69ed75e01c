//! Byte layout of one posting entry inside a shard's postings blob.
//!
//! ```text
//! [len: u32][word id: 8][summary offset: u64][key len: varint][doc key]
//! [packed posting: modified9 words][len: u32]
//! ```
//!
//! All fixed-width integers are big-endian. `len` is the length of the whole
//! entry and appears at both ends so the blob can be walked in either
//! direction. The summary offset always occupies the eight bytes at
//! [`SUMMARY_OFFSET_POS`] regardless of its value: it is rewritten in place
//! by [`patch_summary_offset`], and any width change would shift every
//! following entry.

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::codec::modified9::WORD_LEN;
use crate::codec::posting::{pack_posting_into, unpack_posting};
use crate::error::{Result, WordShardError};
use crate::util::id::{WORD_ID_LEN, WordId};
use crate::util::varint;

const LEN_FIELD: usize = 4;
const WORD_ID_POS: usize = LEN_FIELD;
/// Distance from the entry start to the summary offset field.
pub const SUMMARY_OFFSET_POS: usize = WORD_ID_POS + WORD_ID_LEN;
/// Width of the summary offset field.
pub const SUMMARY_OFFSET_LEN: usize = 8;
const KEY_POS: usize = SUMMARY_OFFSET_POS + SUMMARY_OFFSET_LEN;
/// Smallest possible entry: empty key, one codeword, trailer.
const MIN_ENTRY_LEN: usize = KEY_POS + 1 + 4 + LEN_FIELD;

/// Cheap view of an entry: where it is and which word it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntryHeader {
    pub offset: usize,
    pub len: usize,
    pub word_id: WordId,
}

impl EntryHeader {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// A fully located entry borrowing its key from the blob.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Entry<'a> {
    pub header: EntryHeader,
    pub summary_offset: u64,
    pub doc_key: &'a [u8],
    posting_offset: usize,
    blob: &'a [u8],
}

impl Entry<'_> {
    /// Decode the (doc index, positions) payload.
    pub fn posting(&self) -> Result<(u64, Vec<u64>)> {
        let mut offset = self.posting_offset;
        let posting = unpack_posting(self.blob, &mut offset, true)?;
        if offset != self.header.end() - LEN_FIELD {
            return Err(WordShardError::corrupt(format!(
                "posting entry at offset {} has trailing bytes",
                self.header.offset
            )));
        }
        Ok(posting)
    }
}

/// Append an entry to `blob` and return its start offset.
///
/// On error the blob is left exactly as it was.
pub(crate) fn write_entry(
    blob: &mut Vec<u8>,
    word_id: WordId,
    summary_offset: u64,
    doc_key: &[u8],
    doc_index: u64,
    positions: &[u64],
) -> Result<usize> {
    let start = blob.len();
    let written = write_entry_body(blob, word_id, summary_offset, doc_key, doc_index, positions);
    if written.is_err() {
        blob.truncate(start);
    }
    written.map(|_| start)
}

fn write_entry_body(
    blob: &mut Vec<u8>,
    word_id: WordId,
    summary_offset: u64,
    doc_key: &[u8],
    doc_index: u64,
    positions: &[u64],
) -> Result<()> {
    let start = blob.len();
    // Enough unless a value needs a wide codeword.
    blob.reserve(
        KEY_POS
            + varint::encoded_len(doc_key.len() as u64)
            + doc_key.len()
            + (positions.len() + 1) * WORD_LEN
            + LEN_FIELD,
    );
    // Placeholder for the leading length, filled in below.
    blob.write_u32::<BigEndian>(0)?;
    blob.extend_from_slice(word_id.as_bytes());
    blob.write_u64::<BigEndian>(summary_offset)?;
    varint::write_u64(blob, doc_key.len() as u64);
    blob.extend_from_slice(doc_key);
    pack_posting_into(doc_index, positions, blob)?;

    let len = blob.len() - start + LEN_FIELD;
    let len = u32::try_from(len).map_err(|_| {
        WordShardError::invalid_argument(format!("posting entry of {len} bytes is too large"))
    })?;
    BigEndian::write_u32(&mut blob[start..start + LEN_FIELD], len);
    blob.write_u32::<BigEndian>(len)?;
    Ok(())
}

/// Read the length and word id of the entry starting at `offset`.
pub(crate) fn read_header(blob: &[u8], offset: usize) -> Result<EntryHeader> {
    let head = blob
        .get(offset..offset + KEY_POS)
        .ok_or_else(|| truncated(offset, blob.len()))?;
    let len = BigEndian::read_u32(&head[..LEN_FIELD]) as usize;
    if len < MIN_ENTRY_LEN || offset + len > blob.len() {
        return Err(WordShardError::corrupt(format!(
            "posting entry at offset {offset} has invalid length {len}"
        )));
    }
    let trailer = BigEndian::read_u32(&blob[offset + len - LEN_FIELD..offset + len]) as usize;
    if trailer != len {
        return Err(WordShardError::corrupt(format!(
            "posting entry at offset {offset}: length {len} does not match trailer {trailer}"
        )));
    }

    let mut word = [0u8; WORD_ID_LEN];
    word.copy_from_slice(&head[WORD_ID_POS..SUMMARY_OFFSET_POS]);
    Ok(EntryHeader {
        offset,
        len,
        word_id: WordId::from_bytes(word),
    })
}

/// Read the entry starting at `offset`, up to but excluding its posting payload.
pub(crate) fn read_entry(blob: &[u8], offset: usize) -> Result<Entry<'_>> {
    let header = read_header(blob, offset)?;
    let summary_offset =
        BigEndian::read_u64(&blob[offset + SUMMARY_OFFSET_POS..offset + KEY_POS]);

    let mut pos = offset + KEY_POS;
    let key_len = varint::read_u64(blob, &mut pos)? as usize;
    let key_end = pos
        .checked_add(key_len)
        .filter(|&end| end < header.end() - LEN_FIELD)
        .ok_or_else(|| {
            WordShardError::corrupt(format!(
                "doc key of length {key_len} overruns posting entry at offset {offset}"
            ))
        })?;

    Ok(Entry {
        header,
        summary_offset,
        doc_key: &blob[pos..key_end],
        posting_offset: key_end,
        blob,
    })
}

/// Offset of the entry immediately before the one at `offset`, if any.
pub(crate) fn previous_offset(blob: &[u8], offset: usize) -> Result<Option<usize>> {
    if offset == 0 {
        return Ok(None);
    }
    let trailer = blob
        .get(offset.saturating_sub(LEN_FIELD)..offset)
        .filter(|t| t.len() == LEN_FIELD)
        .ok_or_else(|| truncated(offset, blob.len()))?;
    let len = BigEndian::read_u32(trailer) as usize;
    if len < MIN_ENTRY_LEN || len > offset {
        return Err(WordShardError::corrupt(format!(
            "posting entry ending at offset {offset} has invalid length {len}"
        )));
    }
    Ok(Some(offset - len))
}

/// Overwrite the summary offset of the entry at `offset`.
///
/// Touches exactly [`SUMMARY_OFFSET_LEN`] bytes; the key and posting bytes
/// are never moved.
pub(crate) fn patch_summary_offset(blob: &mut [u8], offset: usize, summary_offset: u64) {
    let start = offset + SUMMARY_OFFSET_POS;
    BigEndian::write_u64(&mut blob[start..start + SUMMARY_OFFSET_LEN], summary_offset);
}

/// Iterator over every entry of a blob in write order.
pub(crate) struct Entries<'a> {
    blob: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> Entries<'a> {
    pub fn new(blob: &'a [u8]) -> Self {
        Self {
            blob,
            pos: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for Entries<'a> {
    type Item = Result<Entry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.blob.len() {
            return None;
        }
        match read_entry(self.blob, self.pos) {
            Ok(entry) => {
                self.pos = entry.header.end();
                Some(Ok(entry))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

fn truncated(offset: usize, len: usize) -> WordShardError {
    WordShardError::corrupt(format!(
        "posting entry at offset {offset} is truncated (postings length {len})"
    ))
}
