//! Error types for chunkdir
//!
//! File-level failures surface as [`Error`]; anything raised by a key-value
//! store adapter is wrapped in [`StoreError`] and propagated unchanged in kind.

use thiserror::Error;

/// Common result type for chunkdir operations
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for store adapter operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failure reported by a key-value store adapter
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("store codec error: {0}")]
    Codec(String),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Create a backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Create a codec error
    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }
}

/// Common error type for chunkdir
#[derive(Debug, Error)]
pub enum Error {
    #[error("file not found: {directory}/{file}")]
    NotFound { directory: String, file: String },

    #[error(
        "read past end of file {file}: position {position} + {requested} bytes exceeds length {length}"
    )]
    EndOfFile {
        file: String,
        position: u64,
        requested: u64,
        length: u64,
    },

    #[error("corrupt state at {key}: {reason}")]
    CorruptState { key: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("directory already closed: {0}")]
    AlreadyClosed(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a not found error for a file in a directory
    pub fn not_found(directory: impl Into<String>, file: impl Into<String>) -> Self {
        Self::NotFound {
            directory: directory.into(),
            file: file.into(),
        }
    }

    /// Create a corrupt state error for a store key
    pub fn corrupt(key: impl ToString, reason: impl Into<String>) -> Self {
        Self::CorruptState {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is an end of file error
    #[must_use]
    pub const fn is_end_of_file(&self) -> bool {
        matches!(self, Self::EndOfFile { .. })
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;

        let kind = match &err {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::EndOfFile { .. } => ErrorKind::UnexpectedEof,
            Error::CorruptState { .. } => ErrorKind::InvalidData,
            Error::InvalidArgument(_) | Error::Configuration(_) => ErrorKind::InvalidInput,
            Error::Store(_) | Error::AlreadyClosed(_) => ErrorKind::Other,
        };
        Self::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_not_found() {
        let err = Error::not_found("index", "Hello.txt");
        assert!(err.is_not_found());
        assert!(!err.is_end_of_file());
        assert_eq!(err.to_string(), "file not found: index/Hello.txt");
    }

    #[test]
    fn test_store_error_is_transparent() {
        let err: Error = StoreError::backend("connection reset").into();
        assert_eq!(err.to_string(), "store backend error: connection reset");
    }

    #[test]
    fn test_io_error_kinds() {
        let eof = Error::EndOfFile {
            file: "a".into(),
            position: 10,
            requested: 5,
            length: 12,
        };
        assert_eq!(
            std::io::Error::from(eof).kind(),
            std::io::ErrorKind::UnexpectedEof
        );

        let corrupt = Error::corrupt("index/a#0", "chunk missing");
        assert_eq!(
            std::io::Error::from(corrupt).kind(),
            std::io::ErrorKind::InvalidData
        );

        let missing = Error::not_found("index", "a");
        assert_eq!(
            std::io::Error::from(missing).kind(),
            std::io::ErrorKind::NotFound
        );
    }
}
