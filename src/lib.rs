//! # Wordshard
//!
//! Storage engine for an inverted word index split into shards.
//!
//! ## Features
//!
//! - Variable-length integer codec for posting lists
//! - Append-only index shards with per-word dictionaries
//! - Bidirectional, resumable posting scans
//! - In-place patching of document summary offsets
//! - Shard merging and a cross-shard index dictionary
//! - Atomic, checksummed shard and dictionary files
// Core modules
pub mod codec;
pub mod config;
pub mod dictionary;
mod error;
pub mod generation;
pub mod shard;
pub mod util;

// Re-exports for the public API
pub use codec::{decode_ints, encode_ints, pack_posting, unpack_posting};
pub use config::{ShardConfig, ShardConfigBuilder};
pub use dictionary::{IndexDictionary, ShardId, ShardWordInfo};
pub use error::{Result, WordShardError};
pub use generation::GenerationWriter;
pub use shard::{
    DictionaryEntry, Direction, DocumentKind, IndexShard, PostingRecord, PostingsSlice, Value,
    ValueKind, pack_auxiliary_document_keys, pack_values, unpack_auxiliary_document_keys,
    unpack_values,
};
pub use util::id::{DefaultWordHasher, DocKey, WordHasher, WordId, WordLookup};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
