//! Core type definitions for chunkdir
//!
//! Every entry a directory keeps in the shared store is addressed by one of
//! the key types below. Each key carries the directory name, so a single
//! store can host any number of independent directories.

use bytes::Bytes;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Key of a file's metadata record
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{directory}/{file}")]
pub struct FileKey {
    pub directory: String,
    pub file: String,
}

impl FileKey {
    pub fn new(directory: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            file: file.into(),
        }
    }

    /// Key of chunk `index` of this file
    #[must_use]
    pub fn chunk(&self, index: u64) -> ChunkKey {
        ChunkKey {
            directory: self.directory.clone(),
            file: self.file.clone(),
            index,
        }
    }
}

/// Key of one chunk of a file's content
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{directory}/{file}#{index}")]
pub struct ChunkKey {
    pub directory: String,
    pub file: String,
    pub index: u64,
}

impl ChunkKey {
    pub fn new(directory: impl Into<String>, file: impl Into<String>, index: u64) -> Self {
        Self {
            directory: directory.into(),
            file: file.into(),
            index,
        }
    }

    /// Key of the metadata record of the file this chunk belongs to
    #[must_use]
    pub fn file_key(&self) -> FileKey {
        FileKey::new(self.directory.clone(), self.file.clone())
    }
}

/// Key of a named directory lock
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{directory}/{lock}.lock")]
pub struct LockKey {
    pub directory: String,
    pub lock: String,
}

impl LockKey {
    pub fn new(directory: impl Into<String>, lock: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            lock: lock.into(),
        }
    }
}

/// Any key a directory stores
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CacheKey {
    File(FileKey),
    Chunk(ChunkKey),
    Lock(LockKey),
}

impl CacheKey {
    /// Directory namespace this key belongs to
    #[must_use]
    pub fn directory(&self) -> &str {
        match self {
            Self::File(k) => &k.directory,
            Self::Chunk(k) => &k.directory,
            Self::Lock(k) => &k.directory,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(k) => write!(f, "{k}"),
            Self::Chunk(k) => write!(f, "{k}"),
            Self::Lock(k) => write!(f, "{k}"),
        }
    }
}

impl From<FileKey> for CacheKey {
    fn from(key: FileKey) -> Self {
        Self::File(key)
    }
}

impl From<ChunkKey> for CacheKey {
    fn from(key: ChunkKey) -> Self {
        Self::Chunk(key)
    }
}

impl From<LockKey> for CacheKey {
    fn from(key: LockKey) -> Self {
        Self::Lock(key)
    }
}

/// Per-file record anchoring chunk existence and count
///
/// Fields this crate does not know about are kept in `extra` and written
/// back untouched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Logical file length in bytes
    pub size: u64,
    /// Last modification time (unix milliseconds)
    #[serde(default)]
    pub last_modified: i64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl FileMetadata {
    /// Metadata for a freshly created, empty file
    #[must_use]
    pub fn new() -> Self {
        Self::with_size(0)
    }

    #[must_use]
    pub fn with_size(size: u64) -> Self {
        Self {
            size,
            last_modified: now_millis(),
            extra: serde_json::Map::new(),
        }
    }

    /// Number of chunks holding this file's content: `ceil(size / chunk_size)`
    #[must_use]
    pub const fn chunk_count(&self, chunk_size: u64) -> u64 {
        self.size.div_ceil(chunk_size)
    }

    /// Bump the modification time to now
    pub fn touch(&mut self) {
        self.last_modified = now_millis();
    }
}

impl Default for FileMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// Record stored under a held lock
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// When the lock was obtained (unix milliseconds)
    pub acquired_at: i64,
}

impl LockRecord {
    #[must_use]
    pub fn now() -> Self {
        Self {
            acquired_at: now_millis(),
        }
    }
}

/// Value stored under a [`CacheKey`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheValue {
    Metadata(FileMetadata),
    Chunk(Bytes),
    Lock(LockRecord),
}

impl CacheValue {
    #[must_use]
    pub fn into_metadata(self) -> Option<FileMetadata> {
        match self {
            Self::Metadata(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_chunk(self) -> Option<Bytes> {
        match self {
            Self::Chunk(b) => Some(b),
            _ => None,
        }
    }

    /// Short name of the value kind, for diagnostics
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Metadata(_) => "metadata",
            Self::Chunk(_) => "chunk",
            Self::Lock(_) => "lock",
        }
    }
}

/// Validate a directory name
///
/// Names must be non-empty and free of NUL bytes, which persistent adapters
/// use as the key component separator.
pub fn validate_directory_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_argument("directory name must not be empty"));
    }
    if name.contains('\0') {
        return Err(Error::invalid_argument(format!(
            "directory name {name:?} contains a NUL byte"
        )));
    }
    Ok(())
}

/// Current wall-clock time in unix milliseconds
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_key_display() {
        assert_eq!(FileKey::new("index", "a.txt").to_string(), "index/a.txt");
        assert_eq!(ChunkKey::new("index", "a.txt", 3).to_string(), "index/a.txt#3");
        assert_eq!(
            CacheKey::from(LockKey::new("index", "write")).to_string(),
            "index/write.lock"
        );
    }

    #[test]
    fn test_key_equality_and_hash() {
        let mut set = HashSet::new();
        set.insert(CacheKey::from(FileKey::new("index", "a")));
        set.insert(CacheKey::from(FileKey::new("index", "a")));
        set.insert(CacheKey::from(FileKey::new("other", "a")));
        set.insert(CacheKey::from(ChunkKey::new("index", "a", 0)));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_chunk_key_round_trips_to_file_key() {
        let file = FileKey::new("index", "segments_1");
        let chunk = file.chunk(7);
        assert_eq!(chunk.index, 7);
        assert_eq!(chunk.file_key(), file);
        assert_eq!(CacheKey::from(chunk).directory(), "index");
    }

    #[test]
    fn test_chunk_count() {
        assert_eq!(FileMetadata::with_size(0).chunk_count(64), 0);
        assert_eq!(FileMetadata::with_size(1).chunk_count(64), 1);
        assert_eq!(FileMetadata::with_size(64).chunk_count(64), 1);
        assert_eq!(FileMetadata::with_size(65).chunk_count(64), 2);
        assert_eq!(FileMetadata::with_size(106).chunk_count(64), 2);
    }

    #[test]
    fn test_metadata_unknown_fields_round_trip() {
        let json = r#"{"size":33,"last_modified":5,"owner":"indexer","generation":4}"#;
        let meta: FileMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.size, 33);
        assert_eq!(meta.extra.len(), 2);

        let back: serde_json::Value = serde_json::to_value(&meta).unwrap();
        assert_eq!(back["owner"], "indexer");
        assert_eq!(back["generation"], 4);
    }

    #[test]
    fn test_validate_directory_name() {
        assert!(validate_directory_name("index").is_ok());
        assert!(validate_directory_name("").is_err());
        assert!(validate_directory_name("bad\0name").is_err());
    }
}
