//! Identifiers used by shards and the index dictionary.
//!
//! Word ids are fixed-width hashes produced outside the engine; doc keys are
//! opaque byte strings usually built from fixed-width host/doc/url hashes.

use std::borrow::Borrow;
use std::fmt;
use std::hash::BuildHasher;

use serde::{Deserialize, Serialize};

/// Width of a [`WordId`] in bytes.
pub const WORD_ID_LEN: usize = 8;

/// Width of each sub-key produced by [`DocKey::from_hashes`].
pub const SUB_KEY_LEN: usize = 8;

/// Fixed-width hash of a term or meta tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WordId([u8; WORD_ID_LEN]);

impl WordId {
    pub const fn from_bytes(bytes: [u8; WORD_ID_LEN]) -> Self {
        WordId(bytes)
    }

    /// Build an id from raw bytes, truncating or zero padding to the fixed width.
    pub fn from_raw(raw: &[u8]) -> Self {
        let mut bytes = [0u8; WORD_ID_LEN];
        let len = raw.len().min(WORD_ID_LEN);
        bytes[..len].copy_from_slice(&raw[..len]);
        WordId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; WORD_ID_LEN] {
        &self.0
    }
}

impl fmt::Debug for WordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WordId(")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

/// Key of an indexed document. Equality is exact; no prefix matching.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocKey(Vec<u8>);

impl DocKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        DocKey(bytes.into())
    }

    /// Concatenate sub-keys into one document key.
    pub fn from_parts(parts: &[&[u8]]) -> Self {
        let len = parts.iter().map(|p| p.len()).sum();
        let mut key = Vec::with_capacity(len);
        for part in parts {
            key.extend_from_slice(part);
        }
        DocKey(key)
    }

    /// Concatenate 64-bit host/doc/url hashes, big-endian, into a key.
    pub fn from_hashes(hashes: &[u64]) -> Self {
        let mut key = Vec::with_capacity(hashes.len() * SUB_KEY_LEN);
        for hash in hashes {
            key.extend_from_slice(&hash.to_be_bytes());
        }
        DocKey(key)
    }

    /// The `index`-th fixed-width sub-key, if the key is long enough.
    pub fn sub_key(&self, index: usize) -> Option<&[u8]> {
        let start = index * SUB_KEY_LEN;
        self.0.get(start..start + SUB_KEY_LEN)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Borrow<[u8]> for DocKey {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for DocKey {
    fn from(s: &str) -> Self {
        DocKey(s.as_bytes().to_vec())
    }
}

impl From<&[u8]> for DocKey {
    fn from(b: &[u8]) -> Self {
        DocKey(b.to_vec())
    }
}

impl fmt::Debug for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "DocKey({s:?})"),
            Err(_) => write!(f, "DocKey({:02x?})", self.0),
        }
    }
}

/// Turns terms into word ids.
///
/// Shards only store the resulting ids, so every writer and reader of an
/// index must agree on the hasher.
pub trait WordHasher: Send + Sync + fmt::Debug {
    fn hash_word(&self, term: &str) -> WordId;
}

/// Fixed-seed `ahash` hasher.
///
/// Stable for a given build of the crate; indexes shared between builds
/// should supply their own hasher.
#[derive(Debug, Clone)]
pub struct DefaultWordHasher {
    state: ahash::RandomState,
}

impl DefaultWordHasher {
    const SEEDS: [u64; 4] = [
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
        0x082e_fa98_ec4e_6c89,
    ];

    pub fn new() -> Self {
        let [k0, k1, k2, k3] = Self::SEEDS;
        Self {
            state: ahash::RandomState::with_seeds(k0, k1, k2, k3),
        }
    }
}

impl Default for DefaultWordHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl WordHasher for DefaultWordHasher {
    fn hash_word(&self, term: &str) -> WordId {
        WordId(self.state.hash_one(term.as_bytes()).to_be_bytes())
    }
}

/// A word lookup: either an already hashed id or a term that still needs
/// hashing.
#[derive(Debug, Clone, Copy)]
pub enum WordLookup<'a> {
    Raw(WordId),
    Term(&'a str),
}

impl WordLookup<'_> {
    pub fn resolve(&self, hasher: &dyn WordHasher) -> WordId {
        match self {
            WordLookup::Raw(id) => *id,
            WordLookup::Term(term) => hasher.hash_word(term),
        }
    }
}

impl From<WordId> for WordLookup<'_> {
    fn from(id: WordId) -> Self {
        WordLookup::Raw(id)
    }
}

impl<'a> From<&'a str> for WordLookup<'a> {
    fn from(term: &'a str) -> Self {
        WordLookup::Term(term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_id_from_raw() {
        let id = WordId::from_raw(b"abc");
        assert_eq!(id.as_bytes(), b"abc\0\0\0\0\0");

        let id = WordId::from_raw(b"0123456789");
        assert_eq!(id.as_bytes(), b"01234567");
    }

    #[test]
    fn test_default_hasher_is_deterministic() {
        let a = DefaultWordHasher::new();
        let b = DefaultWordHasher::default();
        assert_eq!(a.hash_word("rust"), b.hash_word("rust"));
        assert_ne!(a.hash_word("rust"), a.hash_word("rusty"));
    }

    #[test]
    fn test_doc_key_from_hashes() {
        let key = DocKey::from_hashes(&[1, 2, 3]);
        assert_eq!(key.len(), 3 * SUB_KEY_LEN);
        assert_eq!(key.sub_key(1), Some(&2u64.to_be_bytes()[..]));
        assert_eq!(key.sub_key(3), None);
    }

    #[test]
    fn test_doc_key_exact_equality() {
        let short = DocKey::from("AAAAAAAA");
        let long = DocKey::from_parts(&[&b"AAAAAAAA"[..], &b"SSSSSSSS"[..]]);
        assert_ne!(short, long);
        assert_eq!(long, DocKey::from("AAAAAAAASSSSSSSS"));
    }

    #[test]
    fn test_word_lookup_resolve() {
        let hasher = DefaultWordHasher::new();
        let id = hasher.hash_word("crawl");
        assert_eq!(WordLookup::from("crawl").resolve(&hasher), id);
        assert_eq!(WordLookup::from(id).resolve(&hasher), id);
    }
}
