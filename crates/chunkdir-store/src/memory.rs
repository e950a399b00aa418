//! In-memory store adapter

use crate::KeyValueStore;
use chunkdir_common::{CacheKey, CacheValue, StoreResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Key-value store held entirely in process memory
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<CacheKey, CacheValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &CacheKey) -> StoreResult<Option<CacheValue>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: CacheKey, value: CacheValue) -> StoreResult<()> {
        self.entries.write().insert(key, value);
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> StoreResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn put_if_absent(&self, key: CacheKey, value: CacheValue) -> StoreResult<Option<CacheValue>> {
        match self.entries.write().entry(key) {
            Entry::Occupied(existing) => Ok(Some(existing.get().clone())),
            Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(None)
            }
        }
    }

    fn keys(&self, directory: &str) -> StoreResult<Vec<CacheKey>> {
        Ok(self
            .entries
            .read()
            .keys()
            .filter(|k| k.directory() == directory)
            .cloned()
            .collect())
    }
}
