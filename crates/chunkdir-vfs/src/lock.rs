//! Named directory locks
//!
//! A lock is a single store key; whoever inserts it first holds the lock.
//! Locks are advisory and have no owner check or expiry.

use chunkdir_common::{CacheKey, CacheValue, LockKey, LockRecord, Result};
use chunkdir_store::KeyValueStore;
use std::sync::Arc;
use tracing::debug;

/// Handle to a named lock within a directory
pub struct DirectoryLock {
    store: Arc<dyn KeyValueStore>,
    key: LockKey,
}

impl DirectoryLock {
    pub(crate) fn new(store: Arc<dyn KeyValueStore>, key: LockKey) -> Self {
        Self { store, key }
    }

    /// Lock name
    pub fn name(&self) -> &str {
        &self.key.lock
    }

    /// Try to take the lock; returns `false` if it is already held
    pub fn obtain(&self) -> Result<bool> {
        let previous = self.store.put_if_absent(
            CacheKey::Lock(self.key.clone()),
            CacheValue::Lock(LockRecord::now()),
        )?;
        let obtained = previous.is_none();
        debug!(lock = %self.key, obtained, "Obtain lock");
        Ok(obtained)
    }

    /// Release the lock
    pub fn release(&self) -> Result<()> {
        debug!(lock = %self.key, "Release lock");
        Ok(self.store.remove(&CacheKey::Lock(self.key.clone()))?)
    }

    /// Whether anyone currently holds the lock
    pub fn is_locked(&self) -> Result<bool> {
        Ok(self.store.get(&CacheKey::Lock(self.key.clone()))?.is_some())
    }
}
