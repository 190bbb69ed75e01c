use ahash::AHashMap;
use tempfile::TempDir;

use wordshard::{DocKey, Direction, DocumentKind, IndexDictionary, IndexShard, WordId};

fn shard(generation: u64, docs: &[(&str, &[&str])]) -> IndexShard {
    let mut shard = IndexShard::new(generation);
    for (key, words) in docs {
        let positions: AHashMap<WordId, Vec<u64>> = words
            .iter()
            .enumerate()
            .map(|(i, w)| (WordId::from_raw(w.as_bytes()), vec![i as u64, i as u64 + 3]))
            .collect();
        shard
            .add_document_words(&DocKey::from(*key), 0, &positions, &[], DocumentKind::Page)
            .unwrap();
    }
    shard
}

#[test]
fn test_same_word_from_two_shards() -> wordshard::Result<()> {
    let word = WordId::from_raw(b"shared");
    let first = shard(0, &[("a1", &["shared", "only-a"]), ("a2", &["shared"])]);
    let second = shard(1, &[("b1", &["other", "shared"])]);

    let mut dictionary = IndexDictionary::new();
    dictionary.add_shard_dictionary(&first);
    dictionary.add_shard_dictionary(&second);

    let records = dictionary.get_word_info(word);
    assert_eq!(records.len(), 2);
    for (record, shard) in records.iter().zip([&first, &second]) {
        let info = shard.get_word_info(word).unwrap();
        assert_eq!(record.shard_id, shard.generation());
        assert_eq!(record.first_offset, info.first_offset);
        assert_eq!(record.last_offset, info.last_offset);
        assert_eq!(record.count, info.count);
    }

    assert_eq!(dictionary.get_word_info(WordId::from_raw(b"only-a")).len(), 1);
    assert!(dictionary.get_word_info(WordId::from_raw(b"missing")).is_empty());
    Ok(())
}

#[test]
fn test_records_locate_postings() -> wordshard::Result<()> {
    let word = WordId::from_raw(b"shared");
    let shards = [
        shard(4, &[("a1", &["shared"]), ("a2", &["x", "shared"])]),
        shard(9, &[("b1", &["shared", "y"])]),
    ];
    let mut dictionary = IndexDictionary::new();
    for s in &shards {
        dictionary.add_shard_dictionary(s);
    }

    // Persist the shards without their dictionaries and query through the
    // aggregate records alone.
    let mut found = Vec::new();
    for record in dictionary.get_word_info(word) {
        let s = shards.iter().find(|s| s.generation() == record.shard_id).unwrap();
        let stripped = IndexShard::from_bytes(&s.save_without_dictionary_to_bytes()?)?;
        let slice = stripped.get_postings_slice(
            record.first_offset,
            record.first_offset,
            record.last_offset,
            usize::MAX,
            Direction::Ascending,
        )?;
        assert_eq!(slice.len() as u64, record.count);
        found.extend(slice.keys().cloned());
    }
    assert_eq!(
        found,
        vec![DocKey::from("a1"), DocKey::from("a2"), DocKey::from("b1")]
    );
    Ok(())
}

#[test]
fn test_dictionary_file_round_trip() -> wordshard::Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("words.dict");

    let mut dictionary = IndexDictionary::new();
    dictionary.add_shard_dictionary(&shard(0, &[("a", &["p", "q"])]));
    dictionary.add_shard_dictionary(&shard(1, &[("b", &["q", "r"])]));
    dictionary.save(&path)?;

    let loaded = IndexDictionary::load(&path)?;
    assert_eq!(loaded, dictionary);
    assert_eq!(loaded.shard_ids(), &[0, 1]);
    assert_eq!(loaded.get_word_info(WordId::from_raw(b"q")).len(), 2);

    let mut bytes = std::fs::read(&path)?;
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&path, &bytes)?;
    assert!(IndexDictionary::load(&path).unwrap_err().is_fatal());
    Ok(())
}
