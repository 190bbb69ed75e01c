//! Cross-shard dictionary.
//!
//! [`IndexDictionary`] collects the dictionaries of many shards so a query
//! can find, for one word, every shard holding postings for it and the
//! byte range to scan in each. Shards are identified by their generation
//! number ([`ShardId`]); [`ShardConfig::shard_path`](crate::ShardConfig::shard_path)
//! maps an id back to the shard file.
//!
//! ## File format
//!
//! ```text
//! magic "WDIC" | version: u8 | shard count: varint | shard ids: varint*
//! word count: varint
//! per word: word id (8 bytes) | record count: varint
//!           | records: (shard id, first, last, count) as varints
//! crc32: u32 (big-endian) over every preceding byte
//! ```

use std::fs;
use std::path::Path;

use ahash::{AHashMap, AHashSet};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WordShardError};
use crate::shard::IndexShard;
use crate::util::file::write_atomic;
use crate::util::id::{WORD_ID_LEN, WordId};
use crate::util::varint;

/// Identifier of a shard: its generation number.
pub type ShardId = u64;

const MAGIC: &[u8; 4] = b"WDIC";
const VERSION: u8 = 1;
const CHECKSUM_LEN: usize = 4;

/// Where one shard keeps the postings of a word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardWordInfo {
    pub shard_id: ShardId,
    pub first_offset: u64,
    pub last_offset: u64,
    pub count: u64,
}

/// Word id to per-shard posting locations, in registration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexDictionary {
    words: AHashMap<WordId, Vec<ShardWordInfo>>,
    shard_ids: Vec<ShardId>,
    known_shards: AHashSet<ShardId>,
}

impl IndexDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every word of `shard`'s in-memory dictionary.
    ///
    /// Each word gets one more record appended to its list; records from
    /// other shards are untouched. Returns the number of words registered.
    pub fn add_shard_dictionary(&mut self, shard: &IndexShard) -> usize {
        let shard_id = shard.generation();
        let mut registered = 0;
        for (word_id, entry) in shard.words() {
            self.words.entry(*word_id).or_default().push(ShardWordInfo {
                shard_id,
                first_offset: entry.first_offset,
                last_offset: entry.last_offset,
                count: entry.count,
            });
            registered += 1;
        }
        if self.known_shards.insert(shard_id) {
            self.shard_ids.push(shard_id);
        }
        debug!("dictionary: registered {registered} words from shard {shard_id}");
        registered
    }

    /// Location records of a word, one per registration, oldest first.
    /// Empty if no registered shard contains the word.
    pub fn get_word_info(&self, word_id: WordId) -> &[ShardWordInfo] {
        self.words.get(&word_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn num_words(&self) -> usize {
        self.words.len()
    }

    /// Registered shards in first-registration order.
    pub fn shard_ids(&self) -> &[ShardId] {
        &self.shard_ids
    }

    pub fn contains_shard(&self, shard_id: ShardId) -> bool {
        self.known_shards.contains(&shard_id)
    }

    // ── Persistence ─────────────────────────────────────────────────

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.push(VERSION);

        varint::write_u64(&mut out, self.shard_ids.len() as u64);
        for &id in &self.shard_ids {
            varint::write_u64(&mut out, id);
        }

        let mut words: Vec<_> = self.words.iter().collect();
        words.sort_unstable_by_key(|(word_id, _)| **word_id);

        varint::write_u64(&mut out, words.len() as u64);
        for (word_id, records) in words {
            out.extend_from_slice(word_id.as_bytes());
            varint::write_u64(&mut out, records.len() as u64);
            for r in records {
                varint::write_u64(&mut out, r.shard_id);
                varint::write_u64(&mut out, r.first_offset);
                varint::write_u64(&mut out, r.last_offset);
                varint::write_u64(&mut out, r.count);
            }
        }

        let checksum = crc32fast::hash(&out);
        out.extend_from_slice(&checksum.to_be_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MAGIC.len() + 1 + CHECKSUM_LEN {
            return Err(WordShardError::corrupt("dictionary data is too short"));
        }
        let (body, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
        let stored = u32::from_be_bytes([checksum[0], checksum[1], checksum[2], checksum[3]]);
        if stored != crc32fast::hash(body) {
            return Err(WordShardError::corrupt("dictionary checksum mismatch"));
        }
        if &body[..MAGIC.len()] != MAGIC {
            return Err(WordShardError::corrupt("not a dictionary file (bad magic)"));
        }
        if body[MAGIC.len()] != VERSION {
            return Err(WordShardError::corrupt(format!(
                "unsupported dictionary format version {}",
                body[MAGIC.len()]
            )));
        }

        let mut pos = MAGIC.len() + 1;
        let mut dictionary = IndexDictionary::new();

        let shard_count = read_count(body, &mut pos, 1)?;
        for _ in 0..shard_count {
            let id = varint::read_u64(body, &mut pos)?;
            if dictionary.known_shards.insert(id) {
                dictionary.shard_ids.push(id);
            }
        }

        let word_count = read_count(body, &mut pos, WORD_ID_LEN + 1)?;
        dictionary.words.reserve(word_count);
        for _ in 0..word_count {
            let word = body
                .get(pos..pos + WORD_ID_LEN)
                .ok_or_else(|| WordShardError::corrupt("dictionary data is truncated"))?;
            let word_id = WordId::from_raw(word);
            pos += WORD_ID_LEN;

            let record_count = read_count(body, &mut pos, 4)?;
            let mut records = Vec::with_capacity(record_count);
            for _ in 0..record_count {
                let record = ShardWordInfo {
                    shard_id: varint::read_u64(body, &mut pos)?,
                    first_offset: varint::read_u64(body, &mut pos)?,
                    last_offset: varint::read_u64(body, &mut pos)?,
                    count: varint::read_u64(body, &mut pos)?,
                };
                if !dictionary.known_shards.contains(&record.shard_id) {
                    return Err(WordShardError::corrupt(format!(
                        "record for {word_id:?} names unregistered shard {}",
                        record.shard_id
                    )));
                }
                records.push(record);
            }
            dictionary.words.insert(word_id, records);
        }

        if pos != body.len() {
            return Err(WordShardError::corrupt(format!(
                "{} trailing bytes in dictionary data",
                body.len() - pos
            )));
        }
        Ok(dictionary)
    }

    /// Write the dictionary to `path`, replacing any previous version atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes();
        write_atomic(path, &bytes)?;
        debug!(
            "saved dictionary to {} ({} words, {} shards, {} bytes)",
            path.display(),
            self.num_words(),
            self.shard_ids.len(),
            bytes.len()
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes).inspect_err(|e| {
            if e.is_fatal() {
                warn!("dictionary file {} is corrupt: {e}", path.display());
            }
        })
    }
}

/// Read an element count, rejecting counts the remaining bytes cannot hold.
fn read_count(body: &[u8], pos: &mut usize, min_element_len: usize) -> Result<usize> {
    let count = varint::read_u64(body, pos)?;
    let remaining = (body.len() - *pos) as u64;
    if count > remaining / min_element_len as u64 {
        return Err(WordShardError::corrupt(format!(
            "count {count} exceeds remaining dictionary data"
        )));
    }
    Ok(count as usize)
}
