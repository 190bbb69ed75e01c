//! Generation writer.
//!
//! [`GenerationWriter`] fills one in-memory shard at a time. Once the shard
//! holds `max_docs_per_generation` documents it is written to
//! [`ShardConfig::shard_path`], folded into the aggregate
//! [`IndexDictionary`], and replaced by an empty shard for the next
//! generation.

use std::fs;
use std::sync::Arc;

use ahash::AHashMap;
use log::{debug, info};

use crate::config::ShardConfig;
use crate::dictionary::{IndexDictionary, ShardId};
use crate::error::{Result, WordShardError};
use crate::shard::{DocumentKind, IndexShard};
use crate::util::id::{DocKey, WordHasher, WordId};

/// Writes documents into a sequence of shard generations.
#[derive(Debug)]
pub struct GenerationWriter {
    config: ShardConfig,
    current: IndexShard,
    dictionary: IndexDictionary,
    hasher: Option<Arc<dyn WordHasher>>,
}

impl GenerationWriter {
    /// Open a writer over `config.directory`.
    ///
    /// Starts at generation 0 in an empty directory. Otherwise it continues
    /// after the highest shard file present, loading the aggregate
    /// dictionary if one was saved and registering any shard file the
    /// dictionary does not know yet.
    pub fn new(config: ShardConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.directory)?;

        let mut dictionary = match IndexDictionary::load(config.dictionary_path()) {
            Ok(dictionary) => dictionary,
            Err(WordShardError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                IndexDictionary::new()
            }
            Err(e) => return Err(e),
        };

        let existing = config.existing_shard_ids()?;
        for &shard_id in &existing {
            if dictionary.contains_shard(shard_id) {
                continue;
            }
            let shard = open_shard_file(&config, shard_id)?;
            dictionary.add_shard_dictionary(&shard);
            debug!("registered unlisted shard {shard_id} in dictionary");
        }

        let generation = existing.last().map_or(0, |id| id + 1);
        info!(
            "generation writer opened in {} at generation {generation} ({} existing shards)",
            config.directory.display(),
            existing.len()
        );

        let current = IndexShard::new(generation).with_path(config.shard_path(generation));
        Ok(Self {
            config,
            current,
            dictionary,
            hasher: None,
        })
    }

    /// Use `hasher` for term lookups in the current and every later shard.
    pub fn with_hasher(mut self, hasher: Arc<dyn WordHasher>) -> Self {
        self.current = std::mem::replace(&mut self.current, IndexShard::new(0))
            .with_hasher(Arc::clone(&hasher));
        self.hasher = Some(hasher);
        self
    }

    pub fn config(&self) -> &ShardConfig {
        &self.config
    }

    /// Generation of the shard currently being filled.
    pub fn generation(&self) -> u64 {
        self.current.generation()
    }

    pub fn current(&self) -> &IndexShard {
        &self.current
    }

    /// Aggregate dictionary of every rotated shard.
    pub fn dictionary(&self) -> &IndexDictionary {
        &self.dictionary
    }

    /// Append a document to the current shard, rotating it if it is now full.
    ///
    /// Returns the id of the shard that was rotated, if any.
    pub fn add_document_words(
        &mut self,
        doc_key: &DocKey,
        summary_offset: u64,
        word_positions: &AHashMap<WordId, Vec<u64>>,
        meta_ids: &[WordId],
        kind: DocumentKind,
    ) -> Result<Option<ShardId>> {
        self.current
            .add_document_words(doc_key, summary_offset, word_positions, meta_ids, kind)?;
        if self.current.is_full(self.config.max_docs_per_generation) {
            return self.rotate();
        }
        Ok(None)
    }

    /// Patch summary offsets in the current shard.
    ///
    /// Rotated shards are immutable here; open them with
    /// [`open_shard`](Self::open_shard) to patch them.
    pub fn change_document_offsets(&mut self, updates: &AHashMap<DocKey, u64>) -> Result<usize> {
        self.current.change_document_offsets(updates)
    }

    /// Close the current shard and start the next generation.
    ///
    /// An empty shard is not written; `None` is returned instead.
    pub fn rotate(&mut self) -> Result<Option<ShardId>> {
        if self.current.num_docs() == 0 {
            return Ok(None);
        }

        let shard_id = self.current.generation();
        if self.config.keep_shard_dictionary {
            self.current.save()?;
        } else {
            self.current.save_without_dictionary()?;
        }
        self.dictionary.add_shard_dictionary(&self.current);

        let next = shard_id + 1;
        let mut shard = IndexShard::new(next).with_path(self.config.shard_path(next));
        if let Some(hasher) = &self.hasher {
            shard = shard.with_hasher(Arc::clone(hasher));
        }
        let finished = std::mem::replace(&mut self.current, shard);

        debug!(
            "rotated shard {shard_id} ({} docs, {} words, {} postings bytes)",
            finished.num_docs(),
            finished.num_words(),
            finished.postings_len()
        );
        Ok(Some(shard_id))
    }

    /// Save the current shard, dictionary included, without rotating it.
    ///
    /// A checkpointed shard that is never rotated is picked up as a
    /// finished shard by the next [`GenerationWriter::new`].
    pub fn checkpoint(&self) -> Result<()> {
        if self.current.num_docs() == 0 {
            return Ok(());
        }
        self.current.save()
    }

    /// Load a shard written by this writer, with its dictionary rebuilt if
    /// the file was saved without one.
    pub fn open_shard(&self, shard_id: ShardId) -> Result<IndexShard> {
        let shard = open_shard_file(&self.config, shard_id)?;
        Ok(match &self.hasher {
            Some(hasher) => shard.with_hasher(Arc::clone(hasher)),
            None => shard,
        })
    }

    /// Rotate the last shard and save the aggregate dictionary.
    pub fn finish(mut self) -> Result<IndexDictionary> {
        self.rotate()?;
        let path = self.config.dictionary_path();
        self.dictionary.save(&path)?;
        info!(
            "generation writer finished: {} shards, {} words in {}",
            self.dictionary.shard_ids().len(),
            self.dictionary.num_words(),
            path.display()
        );
        Ok(self.dictionary)
    }
}

fn open_shard_file(config: &ShardConfig, shard_id: ShardId) -> Result<IndexShard> {
    let mut shard = IndexShard::load(config.shard_path(shard_id))?;
    if shard.num_words() == 0 && shard.postings_len() > 0 {
        shard.rebuild_dictionary()?;
    }
    Ok(shard)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(words: &[&str]) -> AHashMap<WordId, Vec<u64>> {
        words
            .iter()
            .enumerate()
            .map(|(i, w)| (WordId::from_raw(w.as_bytes()), vec![i as u64]))
            .collect()
    }

    fn writer(dir: &std::path::Path, max_docs: u64) -> GenerationWriter {
        let config = ShardConfig::builder()
            .directory(dir)
            .max_docs_per_generation(max_docs)
            .build()
            .unwrap();
        GenerationWriter::new(config).unwrap()
    }

    #[test]
    fn test_rotates_when_full() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = writer(dir.path(), 2);

        let first = writer
            .add_document_words(&DocKey::from("a"), 0, &doc(&["x"]), &[], DocumentKind::Page)
            .unwrap();
        assert_eq!(first, None);
        let second = writer
            .add_document_words(&DocKey::from("b"), 0, &doc(&["x"]), &[], DocumentKind::Page)
            .unwrap();
        assert_eq!(second, Some(0));
        assert_eq!(writer.generation(), 1);
        assert_eq!(writer.current().num_docs(), 0);
        assert!(writer.config().shard_path(0).exists());
        assert_eq!(writer.dictionary().shard_ids(), &[0]);
    }

    #[test]
    fn test_rotate_empty_shard_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = writer(dir.path(), 2);
        assert_eq!(writer.rotate().unwrap(), None);
        assert_eq!(writer.generation(), 0);
        assert!(writer.config().existing_shard_ids().unwrap().is_empty());
    }

    #[test]
    fn test_open_rotated_shard_rebuilds_dictionary() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = writer(dir.path(), 1);
        writer
            .add_document_words(&DocKey::from("a"), 9, &doc(&["x", "y"]), &[], DocumentKind::Page)
            .unwrap();

        let shard = writer.open_shard(0).unwrap();
        assert_eq!(shard.num_words(), 2);
        let info = shard.get_word_info(WordId::from_raw(b"y")).unwrap();
        assert_eq!(info.count, 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ShardConfig {
            max_docs_per_generation: 0,
            ..ShardConfig::default()
        };
        assert!(GenerationWriter::new(config).is_err());
    }
}
