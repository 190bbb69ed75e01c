//! Shard file format, shared by files on disk and shards shipped as bytes.
//!
//! ```text
//! magic "WSHD" | version: u8 | flags: u8 (bit 0: dictionary present)
//! generation: u64 | num_docs: u64 | len_all_docs: u64 | len_all_link_docs: u64
//! [dictionary, if flagged]
//!     count: u32
//!     count x (word id: 8 bytes | first: u64 | last: u64 | count: u64), sorted by word id
//! postings_len: u64 | postings
//! crc32: u32 over every preceding byte
//! ```
//!
//! All integers are big-endian.

use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, warn};

use crate::error::{Result, WordShardError};
use crate::shard::{DictionaryEntry, IndexShard};
use crate::util::file::write_atomic;
use crate::util::id::{WORD_ID_LEN, WordId};

pub const MAGIC: &[u8; 4] = b"WSHD";
pub const VERSION: u8 = 1;

const FLAG_DICTIONARY: u8 = 0x01;
const CHECKSUM_LEN: usize = 4;
const HEADER_LEN: usize = 4 + 1 + 1 + 4 * 8;

impl IndexShard {
    // ── Save ────────────────────────────────────────────────────────

    /// Write the shard, dictionary included, to its storage location.
    pub fn save(&self) -> Result<()> {
        let path = self.require_path()?;
        self.save_to(path)
    }

    /// Write the shard, dictionary included, to `path`.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.encode(true)?;
        write_atomic(path, &bytes)?;
        debug!(
            "saved shard {} to {} ({} bytes, {} words)",
            self.generation(),
            path.display(),
            bytes.len(),
            self.num_words()
        );
        Ok(())
    }

    /// Serialize the shard, dictionary included, without touching disk.
    pub fn save_to_bytes(&self) -> Result<Vec<u8>> {
        self.encode(true)
    }

    /// Write postings and counters only to the shard's storage location.
    ///
    /// For shards whose words an [`IndexDictionary`](crate::IndexDictionary)
    /// has already absorbed.
    pub fn save_without_dictionary(&self) -> Result<()> {
        let path = self.require_path()?;
        self.save_without_dictionary_to(path)
    }

    /// Write postings and counters only to `path`.
    pub fn save_without_dictionary_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.encode(false)?;
        write_atomic(path, &bytes)?;
        debug!(
            "saved shard {} without dictionary to {} ({} bytes)",
            self.generation(),
            path.display(),
            bytes.len()
        );
        Ok(())
    }

    /// Serialize postings and counters only.
    pub fn save_without_dictionary_to_bytes(&self) -> Result<Vec<u8>> {
        self.encode(false)
    }

    fn require_path(&self) -> Result<&Path> {
        self.path().ok_or_else(|| {
            WordShardError::invalid_argument(format!(
                "shard {} has no storage location",
                self.generation()
            ))
        })
    }

    fn encode(&self, with_dictionary: bool) -> Result<Vec<u8>> {
        let dictionary = self.dictionary();
        let postings = self.postings();
        let dict_len = if with_dictionary {
            4 + dictionary.len() * (WORD_ID_LEN + 24)
        } else {
            0
        };

        let mut out = Vec::with_capacity(HEADER_LEN + dict_len + 8 + postings.len() + CHECKSUM_LEN);
        out.extend_from_slice(MAGIC);
        out.write_u8(VERSION)?;
        out.write_u8(if with_dictionary { FLAG_DICTIONARY } else { 0 })?;
        out.write_u64::<BigEndian>(self.generation())?;
        out.write_u64::<BigEndian>(self.num_docs())?;
        out.write_u64::<BigEndian>(self.len_all_docs())?;
        out.write_u64::<BigEndian>(self.len_all_link_docs())?;

        if with_dictionary {
            let count = u32::try_from(dictionary.len()).map_err(|_| {
                WordShardError::invalid_argument(format!(
                    "dictionary of {} words is too large",
                    dictionary.len()
                ))
            })?;
            let mut words: Vec<_> = dictionary.iter().collect();
            words.sort_unstable_by_key(|(word_id, _)| **word_id);

            out.write_u32::<BigEndian>(count)?;
            for (word_id, entry) in words {
                out.extend_from_slice(word_id.as_bytes());
                out.write_u64::<BigEndian>(entry.first_offset)?;
                out.write_u64::<BigEndian>(entry.last_offset)?;
                out.write_u64::<BigEndian>(entry.count)?;
            }
        }

        out.write_u64::<BigEndian>(postings.len() as u64)?;
        out.extend_from_slice(postings);

        let checksum = crc32fast::hash(&out);
        out.write_u32::<BigEndian>(checksum)?;
        Ok(out)
    }

    // ── Load ────────────────────────────────────────────────────────

    /// Load a shard from a file. The file becomes the shard's storage location.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let shard = Self::decode(&bytes, Some(path.to_path_buf())).inspect_err(|e| {
            if e.is_fatal() {
                warn!("shard file {} is corrupt: {e}", path.display());
            }
        })?;
        debug!(
            "loaded shard {} from {} ({} words, {} docs)",
            shard.generation(),
            path.display(),
            shard.num_words(),
            shard.num_docs()
        );
        Ok(shard)
    }

    /// Rebuild a shard from bytes produced by one of the `*_to_bytes` methods.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::decode(bytes, None)
    }

    /// Rebuild a shard from bytes, recording `path` as its storage location.
    /// No disk I/O takes place.
    pub fn load_from_bytes(path: impl Into<PathBuf>, bytes: &[u8]) -> Result<Self> {
        Self::decode(bytes, Some(path.into()))
    }

    /// Whether serialized shard bytes carry a dictionary section.
    pub fn bytes_have_dictionary(bytes: &[u8]) -> bool {
        bytes.len() > 5 && &bytes[..4] == MAGIC && bytes[5] & FLAG_DICTIONARY != 0
    }

    fn decode(bytes: &[u8], path: Option<PathBuf>) -> Result<Self> {
        if bytes.len() < HEADER_LEN + 8 + CHECKSUM_LEN {
            return Err(WordShardError::corrupt(format!(
                "shard data of {} bytes is too short",
                bytes.len()
            )));
        }
        let (body, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
        let stored = u32::from_be_bytes([checksum[0], checksum[1], checksum[2], checksum[3]]);
        let actual = crc32fast::hash(body);
        if stored != actual {
            return Err(WordShardError::corrupt(format!(
                "shard checksum mismatch: stored {stored:08x}, computed {actual:08x}"
            )));
        }

        let mut cursor = Cursor::new(body);
        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic).map_err(eof)?;
        if &magic != MAGIC {
            return Err(WordShardError::corrupt("not a shard file (bad magic)"));
        }
        let version = cursor.read_u8().map_err(eof)?;
        if version != VERSION {
            return Err(WordShardError::corrupt(format!(
                "unsupported shard format version {version}"
            )));
        }
        let flags = cursor.read_u8().map_err(eof)?;
        let generation = cursor.read_u64::<BigEndian>().map_err(eof)?;
        let num_docs = cursor.read_u64::<BigEndian>().map_err(eof)?;
        let len_all_docs = cursor.read_u64::<BigEndian>().map_err(eof)?;
        let len_all_link_docs = cursor.read_u64::<BigEndian>().map_err(eof)?;

        let mut raw_dictionary = Vec::new();
        if flags & FLAG_DICTIONARY != 0 {
            let count = cursor.read_u32::<BigEndian>().map_err(eof)? as usize;
            let remaining = body.len() - cursor.position() as usize;
            if count > remaining / (WORD_ID_LEN + 24) {
                return Err(WordShardError::corrupt(format!(
                    "dictionary count {count} exceeds shard data"
                )));
            }
            raw_dictionary.reserve(count);
            for _ in 0..count {
                let mut word = [0u8; WORD_ID_LEN];
                cursor.read_exact(&mut word).map_err(eof)?;
                let entry = DictionaryEntry {
                    first_offset: cursor.read_u64::<BigEndian>().map_err(eof)?,
                    last_offset: cursor.read_u64::<BigEndian>().map_err(eof)?,
                    count: cursor.read_u64::<BigEndian>().map_err(eof)?,
                };
                raw_dictionary.push((WordId::from_bytes(word), entry));
            }
        }

        let postings_len = cursor.read_u64::<BigEndian>().map_err(eof)?;
        let start = cursor.position() as usize;
        let end = usize::try_from(postings_len)
            .ok()
            .and_then(|len| start.checked_add(len))
            .filter(|&end| end == body.len())
            .ok_or_else(|| {
                WordShardError::corrupt(format!(
                    "postings length {postings_len} does not match shard data"
                ))
            })?;
        let postings = body[start..end].to_vec();

        let mut dictionary = AHashMap::with_capacity(raw_dictionary.len());
        for (word_id, entry) in raw_dictionary {
            if entry.first_offset > entry.last_offset
                || entry.last_offset >= postings_len
                || entry.count == 0
            {
                return Err(WordShardError::corrupt(format!(
                    "dictionary entry for {word_id:?} points outside the postings"
                )));
            }
            dictionary.insert(word_id, entry);
        }

        Ok(IndexShard::from_parts(
            generation,
            path,
            dictionary,
            postings,
            (num_docs, len_all_docs, len_all_link_docs),
        ))
    }
}

fn eof(e: io::Error) -> WordShardError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        WordShardError::corrupt("shard data is truncated")
    } else {
        WordShardError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::{Direction, DocumentKind};
    use crate::util::id::DocKey;

    fn sample_shard() -> IndexShard {
        let mut shard = IndexShard::new(3);
        for (i, key) in ["alpha", "beta"].iter().enumerate() {
            let words: AHashMap<WordId, Vec<u64>> = [
                (WordId::from_raw(b"w1"), vec![1, 2]),
                (WordId::from_raw(b"w2"), vec![i as u64]),
            ]
            .into_iter()
            .collect();
            shard
                .add_document_words(&DocKey::from(*key), 10 + i as u64, &words, &[], DocumentKind::Page)
                .unwrap();
        }
        shard
    }

    #[test]
    fn test_bytes_round_trip() {
        let shard = sample_shard();
        let bytes = shard.save_to_bytes().unwrap();
        assert!(IndexShard::bytes_have_dictionary(&bytes));

        let loaded = IndexShard::from_bytes(&bytes).unwrap();
        assert_eq!(loaded.generation(), 3);
        assert_eq!(loaded.num_docs(), 2);
        assert_eq!(loaded.len_all_docs(), shard.len_all_docs());
        assert_eq!(loaded.postings(), shard.postings());
        assert_eq!(loaded.dictionary(), shard.dictionary());
        assert!(loaded.path().is_none());

        // Encoding is deterministic.
        assert_eq!(loaded.save_to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_without_dictionary() {
        let shard = sample_shard();
        let bytes = shard.save_without_dictionary_to_bytes().unwrap();
        assert!(!IndexShard::bytes_have_dictionary(&bytes));

        let mut loaded = IndexShard::load_from_bytes("/nonexistent/shard", &bytes).unwrap();
        assert_eq!(loaded.num_words(), 0);
        assert_eq!(loaded.path(), Some(Path::new("/nonexistent/shard")));

        let info = shard.get_word_info(WordId::from_raw(b"w2")).unwrap();
        let slice = loaded
            .get_postings_slice(info.first_offset, info.first_offset, info.last_offset, 10, Direction::Ascending)
            .unwrap();
        assert_eq!(slice.len(), 2);

        loaded.rebuild_dictionary().unwrap();
        assert_eq!(loaded.dictionary(), shard.dictionary());
    }

    #[test]
    fn test_corruption_detected() {
        let mut bytes = sample_shard().save_to_bytes().unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        assert!(IndexShard::from_bytes(&bytes).unwrap_err().is_fatal());

        let bytes = sample_shard().save_to_bytes().unwrap();
        assert!(IndexShard::from_bytes(&bytes[..bytes.len() - 1]).unwrap_err().is_fatal());
        assert!(IndexShard::from_bytes(b"WSHD").unwrap_err().is_fatal());
    }

    #[test]
    fn test_save_requires_location() {
        let shard = sample_shard();
        assert!(matches!(shard.save(), Err(WordShardError::InvalidArgument(_))));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard_000003.shard");
        let shard = sample_shard().with_path(&path);
        shard.save().unwrap();

        let loaded = IndexShard::load(&path).unwrap();
        assert_eq!(loaded.path(), Some(path.as_path()));
        assert_eq!(loaded.postings(), shard.postings());
        assert_eq!(loaded.dictionary(), shard.dictionary());
    }

    #[test]
    fn test_load_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard_000003.shard");
        let bytes = sample_shard().save_to_bytes().unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        assert!(IndexShard::load(&path).unwrap_err().is_fatal());
        assert!(matches!(
            IndexShard::load(dir.path().join("missing.shard")),
            Err(WordShardError::Io(_))
        ));
    }
}
