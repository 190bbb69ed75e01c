//! Configuration for writing shards to disk.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dictionary::ShardId;
use crate::error::{Result, WordShardError};

const SHARD_EXTENSION: &str = "shard";
const DICTIONARY_EXTENSION: &str = "dict";

/// Where shards live and when a generation is rotated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardConfig {
    /// Directory holding shard and dictionary files.
    pub directory: PathBuf,
    /// File name prefix shared by every shard of one index.
    pub file_prefix: String,
    /// Documents per shard before the writer starts a new generation.
    pub max_docs_per_generation: u64,
    /// Keep each rotated shard's own dictionary in its file.
    ///
    /// Off by default: the aggregate dictionary already holds the same
    /// records, and a dictionary-less shard can rebuild its own on load.
    pub keep_shard_dictionary: bool,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            file_prefix: "index_shard".to_string(),
            max_docs_per_generation: 40_000,
            keep_shard_dictionary: false,
        }
    }
}

impl ShardConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    pub fn builder() -> ShardConfigBuilder {
        ShardConfigBuilder::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: ShardConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_docs_per_generation == 0 {
            return Err(WordShardError::invalid_config(
                "max_docs_per_generation must be greater than zero",
            ));
        }
        if self.file_prefix.is_empty() {
            return Err(WordShardError::invalid_config("file_prefix must not be empty"));
        }
        if self.file_prefix.contains(['/', '\\']) {
            return Err(WordShardError::invalid_config(format!(
                "file_prefix {:?} must not contain path separators",
                self.file_prefix
            )));
        }
        Ok(())
    }

    /// Path of the shard file for `shard_id`.
    pub fn shard_path(&self, shard_id: ShardId) -> PathBuf {
        self.directory.join(format!(
            "{}_{shard_id:06}.{SHARD_EXTENSION}",
            self.file_prefix
        ))
    }

    /// Path of the aggregate dictionary file.
    pub fn dictionary_path(&self) -> PathBuf {
        self.directory
            .join(format!("{}.{DICTIONARY_EXTENSION}", self.file_prefix))
    }

    /// Shard id encoded in a file name produced by [`shard_path`](Self::shard_path),
    /// or `None` if the name belongs to another index or file kind.
    pub fn parse_shard_file_name(&self, file_name: &str) -> Option<ShardId> {
        let rest = file_name.strip_prefix(self.file_prefix.as_str())?;
        let rest = rest.strip_prefix('_')?;
        let digits = rest.strip_suffix(SHARD_EXTENSION)?.strip_suffix('.')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Ids of the shard files currently present in the directory, ascending.
    pub fn existing_shard_ids(&self) -> Result<Vec<ShardId>> {
        let read_dir = match fs::read_dir(&self.directory) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| self.parse_shard_file_name(name))
            {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

#[derive(Debug, Default)]
pub struct ShardConfigBuilder {
    config: ShardConfig,
}

impl ShardConfigBuilder {
    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.config.directory = directory.into();
        self
    }

    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.file_prefix = prefix.into();
        self
    }

    pub fn max_docs_per_generation(mut self, max_docs: u64) -> Self {
        self.config.max_docs_per_generation = max_docs;
        self
    }

    pub fn keep_shard_dictionary(mut self, keep: bool) -> Self {
        self.config.keep_shard_dictionary = keep;
        self
    }

    pub fn build(self) -> Result<ShardConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ShardConfig::default();
        assert_eq!(config.directory, PathBuf::from("."));
        assert_eq!(config.file_prefix, "index_shard");
        assert_eq!(config.max_docs_per_generation, 40_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_paths() {
        let config = ShardConfig::new("/data/index");
        assert_eq!(
            config.shard_path(7),
            PathBuf::from("/data/index/index_shard_000007.shard")
        );
        assert_eq!(
            config.dictionary_path(),
            PathBuf::from("/data/index/index_shard.dict")
        );
    }

    #[test]
    fn test_parse_shard_file_name() {
        let config = ShardConfig::default();
        assert_eq!(config.parse_shard_file_name("index_shard_000042.shard"), Some(42));
        assert_eq!(config.parse_shard_file_name("index_shard_1234567.shard"), Some(1234567));
        assert_eq!(config.parse_shard_file_name("index_shard.dict"), None);
        assert_eq!(config.parse_shard_file_name("other_000001.shard"), None);
        assert_eq!(config.parse_shard_file_name("index_shard_.shard"), None);
        assert_eq!(config.parse_shard_file_name("index_shard_00x1.shard"), None);
    }

    #[test]
    fn test_validate() {
        let err = ShardConfig::builder().max_docs_per_generation(0).build().unwrap_err();
        assert!(matches!(err, WordShardError::InvalidConfig(_)));

        let err = ShardConfig::builder().file_prefix("").build().unwrap_err();
        assert!(matches!(err, WordShardError::InvalidConfig(_)));

        let err = ShardConfig::builder().file_prefix("a/b").build().unwrap_err();
        assert!(matches!(err, WordShardError::InvalidConfig(_)));
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = ShardConfig::from_json(r#"{"max_docs_per_generation": 10}"#).unwrap();
        assert_eq!(config.max_docs_per_generation, 10);
        assert_eq!(config.file_prefix, "index_shard");

        let round_trip = ShardConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(round_trip, config);

        assert!(ShardConfig::from_json(r#"{"max_docs_per_generation": 0}"#).is_err());
        assert!(matches!(
            ShardConfig::from_json("{").unwrap_err(),
            WordShardError::Json(_)
        ));
    }

    #[test]
    fn test_existing_shard_ids() {
        let dir = tempfile::tempdir().unwrap();
        let config = ShardConfig::new(dir.path());
        fs::write(config.shard_path(3), b"").unwrap();
        fs::write(config.shard_path(1), b"").unwrap();
        fs::write(config.dictionary_path(), b"").unwrap();
        assert_eq!(config.existing_shard_ids().unwrap(), vec![1, 3]);

        let missing = ShardConfig::new(dir.path().join("missing"));
        assert!(missing.existing_shard_ids().unwrap().is_empty());
    }
}
