//! Error types for the shard storage engine.

use thiserror::Error;

/// Main error type for shard, codec and dictionary operations.
#[derive(Error, Debug)]
pub enum WordShardError {
    /// I/O failure while reading or writing a shard or dictionary file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Encoded data is truncated or malformed.
    #[error("Corrupt data: {0}")]
    Corrupt(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for shard operations.
pub type Result<T> = std::result::Result<T, WordShardError>;

impl WordShardError {
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        WordShardError::Corrupt(msg.into())
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        WordShardError::InvalidArgument(msg.into())
    }

    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        WordShardError::InvalidConfig(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        WordShardError::NotFound(msg.into())
    }

    pub fn other<S: Into<String>>(msg: S) -> Self {
        WordShardError::Other(msg.into())
    }

    /// Whether the error means the stored bytes cannot be trusted.
    ///
    /// Corrupt shards are an operational failure; callers should not retry
    /// the same read.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WordShardError::Corrupt(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WordShardError::corrupt("codeword truncated");
        assert_eq!(err.to_string(), "Corrupt data: codeword truncated");
    }

    #[test]
    fn test_fatal_errors() {
        assert!(WordShardError::corrupt("bad magic").is_fatal());
        assert!(!WordShardError::invalid_argument("x").is_fatal());
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(!WordShardError::from(io).is_fatal());
    }
}
