use ahash::AHashMap;
use tempfile::TempDir;

use wordshard::{
    DocKey, Direction, DocumentKind, GenerationWriter, IndexDictionary, ShardConfig, WordId,
};

fn page(words: &[&str]) -> AHashMap<WordId, Vec<u64>> {
    words
        .iter()
        .enumerate()
        .map(|(i, w)| (WordId::from_raw(w.as_bytes()), vec![i as u64 * 2]))
        .collect()
}

fn config(dir: &TempDir, max_docs: u64) -> ShardConfig {
    ShardConfig::builder()
        .directory(dir.path())
        .file_prefix("crawl")
        .max_docs_per_generation(max_docs)
        .build()
        .unwrap()
}

#[test]
fn test_rotation_and_finish() -> wordshard::Result<()> {
    let dir = TempDir::new().unwrap();
    let mut writer = GenerationWriter::new(config(&dir, 2))?;

    let mut rotated = Vec::new();
    for i in 0..5 {
        let key = DocKey::from_hashes(&[7, i]);
        if let Some(id) = writer.add_document_words(
            &key,
            i * 10,
            &page(&["common", if i % 2 == 0 { "even" } else { "odd" }]),
            &[WordId::from_raw(b"site:x")],
            DocumentKind::Page,
        )? {
            rotated.push(id);
        }
    }
    assert_eq!(rotated, vec![0, 1]);
    assert_eq!(writer.generation(), 2);
    assert_eq!(writer.current().num_docs(), 1);

    let cfg = writer.config().clone();
    let dictionary = writer.finish()?;
    assert_eq!(dictionary.shard_ids(), &[0, 1, 2]);
    assert!(cfg.dictionary_path().exists());
    assert_eq!(cfg.existing_shard_ids()?, vec![0, 1, 2]);

    let common = dictionary.get_word_info(WordId::from_raw(b"common"));
    assert_eq!(common.iter().map(|r| r.count).sum::<u64>(), 5);
    let meta = dictionary.get_word_info(WordId::from_raw(b"site:x"));
    assert_eq!(meta.len(), 3);

    assert_eq!(IndexDictionary::load(cfg.dictionary_path())?, dictionary);
    Ok(())
}

#[test]
fn test_reopen_continues_after_last_generation() -> wordshard::Result<()> {
    let dir = TempDir::new().unwrap();

    let mut writer = GenerationWriter::new(config(&dir, 1))?;
    writer.add_document_words(&DocKey::from("a"), 0, &page(&["w"]), &[], DocumentKind::Page)?;
    writer.finish()?;

    let mut writer = GenerationWriter::new(config(&dir, 1))?;
    assert_eq!(writer.generation(), 1);
    assert_eq!(writer.dictionary().shard_ids(), &[0]);
    writer.add_document_words(&DocKey::from("b"), 0, &page(&["w"]), &[], DocumentKind::Page)?;
    let dictionary = writer.finish()?;

    let records = dictionary.get_word_info(WordId::from_raw(b"w"));
    assert_eq!(records.iter().map(|r| r.shard_id).collect::<Vec<_>>(), vec![0, 1]);
    Ok(())
}

#[test]
fn test_checkpoint_is_recovered() -> wordshard::Result<()> {
    let dir = TempDir::new().unwrap();

    let mut writer = GenerationWriter::new(config(&dir, 100))?;
    writer.add_document_words(&DocKey::from("a"), 0, &page(&["w"]), &[], DocumentKind::Page)?;
    writer.checkpoint()?;
    drop(writer);

    let writer = GenerationWriter::new(config(&dir, 100))?;
    assert_eq!(writer.generation(), 1);
    assert!(writer.dictionary().contains_shard(0));
    assert_eq!(writer.dictionary().get_word_info(WordId::from_raw(b"w")).len(), 1);
    Ok(())
}

#[test]
fn test_patch_then_read_back() -> wordshard::Result<()> {
    let dir = TempDir::new().unwrap();
    let mut writer = GenerationWriter::new(config(&dir, 100))?;
    let key = DocKey::from("pending");
    writer.add_document_words(&key, 0, &page(&["w"]), &[], DocumentKind::Page)?;

    let updates: AHashMap<DocKey, u64> = [(key.clone(), 4096)].into_iter().collect();
    assert_eq!(writer.change_document_offsets(&updates)?, 1);

    let id = writer.rotate()?.unwrap();
    let shard = writer.open_shard(id)?;
    let slice = shard.get_postings_slice_by_id(WordId::from_raw(b"w"), 1, Direction::Ascending)?;
    assert_eq!(slice.get(&key).unwrap().summary_offset, 4096);
    Ok(())
}
