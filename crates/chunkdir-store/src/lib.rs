//! chunkdir Store - key-value store adapters
//!
//! Directories never talk to a cache directly; they go through the
//! [`KeyValueStore`] trait. Each call is an independent single-key operation:
//! adapters provide no cross-key transactions, and callers must not assume
//! any.
//!
//! Two adapters ship with the crate:
//!
//! - [`MemoryStore`]: a process-local map, used for tests and embedding
//! - [`RedbStore`]: a persistent redb database with one table per key kind

pub mod memory;
pub mod redb_store;
pub mod tables;

pub use memory::MemoryStore;
pub use redb_store::{RedbStore, RedbStoreError};

use chunkdir_common::{
    CacheKey, CacheValue, Result, StoreBackend, StoreConfig, StoreError, StoreResult,
};
use std::sync::Arc;

/// Key-value store consumed by directories, readers and writers
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value stored under `key`
    fn get(&self, key: &CacheKey) -> StoreResult<Option<CacheValue>>;

    /// Store `value` under `key`, overwriting any previous value
    fn put(&self, key: CacheKey, value: CacheValue) -> StoreResult<()>;

    /// Remove `key`; removing an absent key is not an error
    fn remove(&self, key: &CacheKey) -> StoreResult<()>;

    /// Store `value` only if `key` is absent
    ///
    /// Returns the existing value when the key was already present, in which
    /// case nothing is written. Atomic for the single key.
    fn put_if_absent(&self, key: CacheKey, value: CacheValue) -> StoreResult<Option<CacheValue>>;

    /// All keys belonging to the directory named `directory`
    fn keys(&self, directory: &str) -> StoreResult<Vec<CacheKey>>;
}

/// Open the store adapter selected by `config`
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn KeyValueStore>> {
    config.validate()?;
    match (config.backend, &config.path) {
        (StoreBackend::Redb, Some(path)) => {
            let store = RedbStore::open(path).map_err(StoreError::from)?;
            Ok(Arc::new(store))
        }
        _ => Ok(Arc::new(MemoryStore::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkdir_common::{FileKey, FileMetadata};

    #[test]
    fn test_open_memory_store() {
        let store = open_store(&StoreConfig::default()).unwrap();
        let key = CacheKey::from(FileKey::new("index", "a"));
        store
            .put(key.clone(), CacheValue::Metadata(FileMetadata::with_size(3)))
            .unwrap();
        assert!(store.get(&key).unwrap().is_some());
    }

    #[test]
    fn test_open_redb_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            backend: StoreBackend::Redb,
            path: Some(dir.path().join("nested").join("store.redb")),
        };
        let store = open_store(&config).unwrap();
        assert!(store.keys("index").unwrap().is_empty());
    }

    #[test]
    fn test_open_redb_without_path_fails() {
        let config = StoreConfig {
            backend: StoreBackend::Redb,
            path: None,
        };
        assert!(open_store(&config).is_err());
    }
}
