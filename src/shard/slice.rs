//! Results of posting range scans.

use serde::{Deserialize, Serialize};

use crate::util::id::DocKey;

/// Scan direction over a word's postings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Oldest entry first (insertion order).
    #[default]
    Ascending,
    /// Newest entry first.
    Descending,
}

/// One decoded posting of a word for a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingRecord {
    /// Shard-local ordinal of the document.
    pub doc_index: u64,
    /// Pointer into the external document summary store.
    pub summary_offset: u64,
    /// Ascending token positions; empty for meta ids.
    pub positions: Vec<u64>,
}

/// A page of postings keyed by document, in scan order.
///
/// Keys are not deduplicated: a merged shard can legitimately hold the
/// same document twice for one word.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingsSlice {
    entries: Vec<(DocKey, PostingRecord)>,
    next_cursor: Option<u64>,
}

impl PostingsSlice {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, key: DocKey, record: PostingRecord) {
        self.entries.push((key, record));
    }

    pub(crate) fn set_next_cursor(&mut self, cursor: Option<u64>) {
        self.next_cursor = cursor;
    }

    /// Cursor to pass to the next `get_postings_slice` call, or `None`
    /// once the range is exhausted.
    pub fn next_cursor(&self) -> Option<u64> {
        self.next_cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Document keys in scan order.
    pub fn keys(&self) -> impl Iterator<Item = &DocKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// First record for `key`.
    pub fn get(&self, key: &DocKey) -> Option<&PostingRecord> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, r)| r)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(DocKey, PostingRecord)> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> Vec<(DocKey, PostingRecord)> {
        self.entries
    }
}

impl IntoIterator for PostingsSlice {
    type Item = (DocKey, PostingRecord);
    type IntoIter = std::vec::IntoIter<(DocKey, PostingRecord)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
