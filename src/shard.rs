//! Index shards.
//!
//! An [`IndexShard`] is one append-only index segment: a word dictionary
//! mapping each [`WordId`] to the byte range of its postings, plus the
//! postings blob itself. Entries of different words interleave in the blob
//! in the order they were appended; every entry records its word id, so a
//! word's range is scanned by skipping entries of other words.
//!
//! A shard is only ever extended ([`IndexShard::add_document_words`],
//! [`IndexShard::append_index_shard`]) or field-patched
//! ([`IndexShard::change_document_offsets`]). It is never shrunk or
//! reordered, so offsets handed out by [`IndexShard::get_word_info`] stay
//! valid for the shard's lifetime.
//!
//! # Concurrency
//!
//! A shard has a single writer. Readers must not run concurrently with a
//! mutation; exchange shards between workers as bytes
//! ([`IndexShard::save_to_bytes`]) rather than sharing them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WordShardError};
use crate::util::id::{DefaultWordHasher, DocKey, WordHasher, WordId, WordLookup};

pub(crate) mod entry;
pub mod format;
pub mod pack;
pub mod slice;

pub use pack::{
    Value, ValueKind, pack_auxiliary_document_keys, pack_values, unpack_auxiliary_document_keys,
    unpack_values,
};
pub use slice::{Direction, PostingRecord, PostingsSlice};

/// Location of one word's postings inside a shard's postings blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    /// Offset of the first posting entry for the word.
    pub first_offset: u64,
    /// Offset of the last posting entry for the word.
    pub last_offset: u64,
    /// Number of posting entries for the word.
    pub count: u64,
}

/// Which running length counter a document contributes to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    /// Ordinary page text.
    #[default]
    Page,
    /// Anchor text of a link pointing at the document.
    Link,
}

/// One appendable index segment.
pub struct IndexShard {
    generation: u64,
    path: Option<PathBuf>,
    dictionary: AHashMap<WordId, DictionaryEntry>,
    postings: Vec<u8>,
    num_docs: u64,
    len_all_docs: u64,
    len_all_link_docs: u64,
    hasher: Arc<dyn WordHasher>,
}

impl fmt::Debug for IndexShard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexShard")
            .field("generation", &self.generation)
            .field("path", &self.path)
            .field("num_words", &self.dictionary.len())
            .field("postings_len", &self.postings.len())
            .field("num_docs", &self.num_docs)
            .field("len_all_docs", &self.len_all_docs)
            .field("len_all_link_docs", &self.len_all_link_docs)
            .finish()
    }
}

impl IndexShard {
    /// Create an empty, in-memory shard for `generation`.
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            path: None,
            dictionary: AHashMap::new(),
            postings: Vec::new(),
            num_docs: 0,
            len_all_docs: 0,
            len_all_link_docs: 0,
            hasher: Arc::new(DefaultWordHasher::new()),
        }
    }

    /// Set the file that [`IndexShard::save`] writes to.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the hasher used to resolve [`WordLookup::Term`] lookups.
    pub fn with_hasher(mut self, hasher: Arc<dyn WordHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub(crate) fn from_parts(
        generation: u64,
        path: Option<PathBuf>,
        dictionary: AHashMap<WordId, DictionaryEntry>,
        postings: Vec<u8>,
        counters: (u64, u64, u64),
    ) -> Self {
        let (num_docs, len_all_docs, len_all_link_docs) = counters;
        Self {
            generation,
            path,
            dictionary,
            postings,
            num_docs,
            len_all_docs,
            len_all_link_docs,
            hasher: Arc::new(DefaultWordHasher::new()),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of documents appended, including those of merged shards.
    pub fn num_docs(&self) -> u64 {
        self.num_docs
    }

    /// Number of distinct words in the dictionary.
    pub fn num_words(&self) -> usize {
        self.dictionary.len()
    }

    /// Length of the postings blob in bytes.
    pub fn postings_len(&self) -> u64 {
        self.postings.len() as u64
    }

    /// Sum of position list lengths over page documents.
    pub fn len_all_docs(&self) -> u64 {
        self.len_all_docs
    }

    /// Sum of position list lengths over link documents.
    pub fn len_all_link_docs(&self) -> u64 {
        self.len_all_link_docs
    }

    /// Whether the shard holds at least `max_docs` documents.
    pub fn is_full(&self, max_docs: u64) -> bool {
        self.num_docs >= max_docs
    }

    /// Dictionary entries in no particular order.
    pub fn words(&self) -> impl Iterator<Item = (&WordId, &DictionaryEntry)> {
        self.dictionary.iter()
    }

    pub(crate) fn dictionary(&self) -> &AHashMap<WordId, DictionaryEntry> {
        &self.dictionary
    }

    pub(crate) fn postings(&self) -> &[u8] {
        &self.postings
    }

    // ── Mutation ────────────────────────────────────────────────────

    /// Append one document.
    ///
    /// Every word in `word_positions`, and every meta id not already among
    /// them, gets a posting entry at the end of the postings blob. Meta ids
    /// are stored with an empty position list. The document's position
    /// count is added to the counter selected by `kind`.
    ///
    /// Position lists must be strictly ascending; if any is not, nothing is
    /// written.
    pub fn add_document_words(
        &mut self,
        doc_key: &DocKey,
        summary_offset: u64,
        word_positions: &AHashMap<WordId, Vec<u64>>,
        meta_ids: &[WordId],
        kind: DocumentKind,
    ) -> Result<()> {
        for (word_id, positions) in word_positions {
            if positions.windows(2).any(|w| w[0] >= w[1]) {
                return Err(WordShardError::invalid_argument(format!(
                    "positions for {word_id:?} in {doc_key:?} are not strictly ascending"
                )));
            }
        }

        self.ensure_dictionary()?;
        let doc_index = self.num_docs;

        let mut words: Vec<(&WordId, &Vec<u64>)> = word_positions.iter().collect();
        words.sort_unstable_by_key(|(word_id, _)| **word_id);
        for (word_id, positions) in words {
            self.append_entry(*word_id, summary_offset, doc_key.as_bytes(), doc_index, positions)?;
        }

        let mut seen_meta = AHashSet::new();
        for meta_id in meta_ids {
            if word_positions.contains_key(meta_id) || !seen_meta.insert(*meta_id) {
                continue;
            }
            self.append_entry(*meta_id, summary_offset, doc_key.as_bytes(), doc_index, &[])?;
        }

        let total: u64 = word_positions.values().map(|p| p.len() as u64).sum();
        match kind {
            DocumentKind::Page => self.len_all_docs += total,
            DocumentKind::Link => self.len_all_link_docs += total,
        }
        self.num_docs += 1;

        trace!(
            "shard {}: appended {:?} as doc {} ({} words, {} meta ids, {} positions)",
            self.generation,
            doc_key,
            doc_index,
            word_positions.len(),
            seen_meta.len(),
            total
        );
        Ok(())
    }

    /// Rebuild a missing dictionary so it covers the postings already in
    /// the blob before new entries extend it.
    fn ensure_dictionary(&mut self) -> Result<()> {
        if self.dictionary.is_empty() && !self.postings.is_empty() {
            self.rebuild_dictionary()?;
            debug!(
                "shard {}: rebuilt dictionary of {} words before appending",
                self.generation,
                self.dictionary.len()
            );
        }
        Ok(())
    }

    fn append_entry(
        &mut self,
        word_id: WordId,
        summary_offset: u64,
        doc_key: &[u8],
        doc_index: u64,
        positions: &[u64],
    ) -> Result<()> {
        let offset = entry::write_entry(
            &mut self.postings,
            word_id,
            summary_offset,
            doc_key,
            doc_index,
            positions,
        )? as u64;

        self.dictionary
            .entry(word_id)
            .and_modify(|e| {
                e.last_offset = offset;
                e.count += 1;
            })
            .or_insert(DictionaryEntry {
                first_offset: offset,
                last_offset: offset,
                count: 1,
            });
        Ok(())
    }

    /// Append every posting of `other` after this shard's postings.
    ///
    /// Entries are re-appended in `other`'s blob order, so each word keeps
    /// its insertion order and lands after this shard's existing postings
    /// for that word. Doc indices are rebased past this shard's documents.
    /// Keys are copied as they are: the merge concatenates, it does not
    /// deduplicate. `other` may have been loaded without its dictionary.
    ///
    /// If `other` turns out to be corrupt, this shard is left unchanged.
    pub fn append_index_shard(&mut self, other: &IndexShard) -> Result<()> {
        let mut decoded = Vec::new();
        for item in entry::Entries::new(&other.postings) {
            let e = item?;
            let (doc_index, positions) = e.posting()?;
            decoded.push((e.header.word_id, e.summary_offset, e.doc_key, doc_index, positions));
        }

        self.ensure_dictionary()?;
        let base = self.num_docs;
        let before = self.postings.len();
        for (word_id, summary_offset, doc_key, doc_index, positions) in decoded {
            self.append_entry(word_id, summary_offset, doc_key, base + doc_index, &positions)?;
        }

        self.num_docs += other.num_docs;
        self.len_all_docs += other.len_all_docs;
        self.len_all_link_docs += other.len_all_link_docs;

        debug!(
            "shard {}: appended shard {} ({} docs, {} -> {} postings bytes)",
            self.generation,
            other.generation,
            other.num_docs,
            before,
            self.postings.len()
        );
        Ok(())
    }

    /// Rewrite the summary offset of every posting whose doc key is in
    /// `updates`. Keys must match exactly; unknown keys are ignored.
    ///
    /// Only the fixed-width summary field of each matching entry changes.
    /// Returns the number of entries patched.
    pub fn change_document_offsets(&mut self, updates: &AHashMap<DocKey, u64>) -> Result<usize> {
        if updates.is_empty() {
            return Ok(0);
        }

        let mut patches = Vec::new();
        for item in entry::Entries::new(&self.postings) {
            let e = item?;
            if let Some(&new_offset) = updates.get(e.doc_key) {
                patches.push((e.header.offset, new_offset));
            }
        }

        for &(offset, new_offset) in &patches {
            entry::patch_summary_offset(&mut self.postings, offset, new_offset);
        }

        trace!(
            "shard {}: patched {} summary offsets for {} keys",
            self.generation,
            patches.len(),
            updates.len()
        );
        Ok(patches.len())
    }

    /// Recreate the dictionary from the postings blob.
    ///
    /// Needed after loading a shard saved without its dictionary.
    pub fn rebuild_dictionary(&mut self) -> Result<()> {
        let mut dictionary: AHashMap<WordId, DictionaryEntry> = AHashMap::new();
        for item in entry::Entries::new(&self.postings) {
            let header = item?.header;
            let offset = header.offset as u64;
            dictionary
                .entry(header.word_id)
                .and_modify(|e| {
                    e.last_offset = offset;
                    e.count += 1;
                })
                .or_insert(DictionaryEntry {
                    first_offset: offset,
                    last_offset: offset,
                    count: 1,
                });
        }
        self.dictionary = dictionary;
        Ok(())
    }

    // ── Lookup ──────────────────────────────────────────────────────

    /// Dictionary entry for a word, or `None` if the word was never added.
    ///
    /// Accepts a raw [`WordId`] or a term, which is hashed with the shard's
    /// [`WordHasher`].
    pub fn get_word_info<'a>(&self, word: impl Into<WordLookup<'a>>) -> Option<DictionaryEntry> {
        let word_id = word.into().resolve(self.hasher.as_ref());
        self.dictionary.get(&word_id).copied()
    }

    /// Up to `max_count` postings of a word, from its first entry
    /// (`Ascending`) or its last (`Descending`). Empty if the word is absent.
    pub fn get_postings_slice_by_id<'a>(
        &self,
        word: impl Into<WordLookup<'a>>,
        max_count: usize,
        direction: Direction,
    ) -> Result<PostingsSlice> {
        let Some(info) = self.get_word_info(word) else {
            return Ok(PostingsSlice::new());
        };
        let cursor = match direction {
            Direction::Ascending => info.first_offset,
            Direction::Descending => info.last_offset,
        };
        self.get_postings_slice(cursor, info.first_offset, info.last_offset, max_count, direction)
    }

    /// Resumable scan of the word whose first entry is at `first_offset`.
    ///
    /// Starts at `cursor_offset` (an entry boundary, normally `first_offset`,
    /// `last_offset` or a previous slice's [`PostingsSlice::next_cursor`])
    /// and moves toward `last_offset` or `first_offset` depending on
    /// `direction`, stopping after `max_count` postings or at the boundary.
    /// A cursor outside `[first_offset, last_offset]` yields an empty slice.
    pub fn get_postings_slice(
        &self,
        cursor_offset: u64,
        first_offset: u64,
        last_offset: u64,
        max_count: usize,
        direction: Direction,
    ) -> Result<PostingsSlice> {
        let (first, last) = self.check_range(first_offset, last_offset)?;
        let mut slice = PostingsSlice::new();
        let Ok(cursor) = usize::try_from(cursor_offset) else {
            return Ok(slice);
        };
        if cursor < first || cursor > last {
            return Ok(slice);
        }

        let word_id = entry::read_header(&self.postings, first)?.word_id;
        let mut pos = Some(cursor);

        while let Some(offset) = pos {
            if slice.len() >= max_count {
                break;
            }
            let header = entry::read_header(&self.postings, offset)?;
            if header.word_id == word_id {
                let e = entry::read_entry(&self.postings, offset)?;
                let (doc_index, positions) = e.posting()?;
                slice.push(
                    DocKey::from(e.doc_key),
                    PostingRecord {
                        doc_index,
                        summary_offset: e.summary_offset,
                        positions,
                    },
                );
            }
            pos = self.step(header, first, last, direction)?;
        }

        slice.set_next_cursor(pos.map(|p| p as u64));
        Ok(slice)
    }

    /// Offset of the word's entry at or after `from_offset` (`Ascending`)
    /// or at or before it (`Descending`), within `[first_offset, last_offset]`.
    pub fn next_posting_offset(
        &self,
        first_offset: u64,
        last_offset: u64,
        from_offset: u64,
        direction: Direction,
    ) -> Result<Option<u64>> {
        let (first, last) = self.check_range(first_offset, last_offset)?;
        let word_id = entry::read_header(&self.postings, first)?.word_id;

        let mut pos = Some(match direction {
            Direction::Ascending => first,
            Direction::Descending => last,
        });
        while let Some(offset) = pos {
            let header = entry::read_header(&self.postings, offset)?;
            let reached = match direction {
                Direction::Ascending => offset as u64 >= from_offset,
                Direction::Descending => offset as u64 <= from_offset,
            };
            if reached && header.word_id == word_id {
                return Ok(Some(offset as u64));
            }
            pos = self.step(header, first, last, direction)?;
        }
        Ok(None)
    }

    /// The entry after (or before) `header` inside `[first, last]`.
    fn step(
        &self,
        header: entry::EntryHeader,
        first: usize,
        last: usize,
        direction: Direction,
    ) -> Result<Option<usize>> {
        Ok(match direction {
            Direction::Ascending => Some(header.end()).filter(|&next| next <= last),
            Direction::Descending if header.offset == first => None,
            Direction::Descending => entry::previous_offset(&self.postings, header.offset)?
                .filter(|&prev| prev >= first),
        })
    }

    fn check_range(&self, first_offset: u64, last_offset: u64) -> Result<(usize, usize)> {
        let len = self.postings.len() as u64;
        if first_offset > last_offset || last_offset >= len {
            return Err(WordShardError::invalid_argument(format!(
                "posting range {first_offset}..={last_offset} is outside postings of {len} bytes"
            )));
        }
        Ok((first_offset as usize, last_offset as usize))
    }
}
