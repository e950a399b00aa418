//! Persistent store adapter backed by redb.
//!
//! Each key kind lives in its own table (see [`crate::tables`]). Key
//! components are joined with NUL bytes, so a directory's entries share the
//! `"dir\x00"` prefix. Every mutation runs in its own write transaction:
//! the adapter offers single-key atomicity and nothing more.

use crate::KeyValueStore;
use crate::tables;
use bytes::Bytes;
use chunkdir_common::{CacheKey, CacheValue, ChunkKey, FileKey, LockKey, StoreError, StoreResult};
use redb::{Database, ReadableTable, TableDefinition, TableHandle};
use std::path::Path;
use tracing::{error, info};

const SEP: char = '\0';

/// Error type for redb store operations
#[derive(Debug, thiserror::Error)]
pub enum RedbStoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed key '{0}'")]
    MalformedKey(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redb::TransactionError> for RedbStoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl From<RedbStoreError> for StoreError {
    fn from(e: RedbStoreError) -> Self {
        match e {
            RedbStoreError::Io(io) => Self::Io(io),
            RedbStoreError::Json(_) | RedbStoreError::MalformedKey(_) => {
                Self::Codec(e.to_string())
            }
            other => Self::Backend(other.to_string()),
        }
    }
}

pub type RedbStoreResult<T> = Result<T, RedbStoreError>;

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

/// Persistent key-value store backed by redb.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open (or create) the redb database at the given path.
    pub fn open(path: impl AsRef<Path>) -> RedbStoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Create all tables eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(tables::FILES)?;
            let _t = write_txn.open_table(tables::CHUNKS)?;
            let _t = write_txn.open_table(tables::LOCKS)?;
        }
        write_txn.commit()?;

        info!("Opened redb store at {}", path.display());
        Ok(Self { db })
    }

    // ---- Key / value codec ----

    fn encode_key(key: &CacheKey) -> (Table, String) {
        match key {
            CacheKey::File(k) => (tables::FILES, format!("{}{SEP}{}", k.directory, k.file)),
            CacheKey::Chunk(k) => (
                tables::CHUNKS,
                format!("{}{SEP}{}{SEP}{:016x}", k.directory, k.file, k.index),
            ),
            CacheKey::Lock(k) => (tables::LOCKS, format!("{}{SEP}{}", k.directory, k.lock)),
        }
    }

    fn decode_key(table: Table, raw: &str) -> RedbStoreResult<CacheKey> {
        let malformed = || RedbStoreError::MalformedKey(raw.escape_default().to_string());
        let (directory, rest) = raw.split_once(SEP).ok_or_else(malformed)?;

        if table.name() == tables::CHUNKS.name() {
            let (file, index) = rest.rsplit_once(SEP).ok_or_else(malformed)?;
            let index = u64::from_str_radix(index, 16).map_err(|_| malformed())?;
            Ok(ChunkKey::new(directory, file, index).into())
        } else if table.name() == tables::LOCKS.name() {
            Ok(LockKey::new(directory, rest).into())
        } else {
            Ok(FileKey::new(directory, rest).into())
        }
    }

    fn encode_value(value: &CacheValue) -> RedbStoreResult<Vec<u8>> {
        match value {
            CacheValue::Metadata(meta) => Ok(serde_json::to_vec(meta)?),
            CacheValue::Chunk(bytes) => Ok(bytes.to_vec()),
            CacheValue::Lock(lock) => Ok(serde_json::to_vec(lock)?),
        }
    }

    fn decode_value(key: &CacheKey, bytes: &[u8]) -> RedbStoreResult<CacheValue> {
        match key {
            CacheKey::File(_) => Ok(CacheValue::Metadata(serde_json::from_slice(bytes)?)),
            CacheKey::Chunk(_) => Ok(CacheValue::Chunk(Bytes::copy_from_slice(bytes))),
            CacheKey::Lock(_) => Ok(CacheValue::Lock(serde_json::from_slice(bytes)?)),
        }
    }

    // ---- Generic helpers ----

    fn get_bytes(&self, table_def: Table, key: &str) -> RedbStoreResult<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table_def)?;
        Ok(table.get(key)?.map(|v| v.value().to_vec()))
    }

    fn put_bytes(&self, table_def: Table, key: &str, value: &[u8]) -> RedbStoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(table_def)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn delete_key(&self, table_def: Table, key: &str) -> RedbStoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(table_def)?;
            table.remove(key)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Insert unless present; returns the existing bytes otherwise.
    fn insert_if_absent(
        &self,
        table_def: Table,
        key: &str,
        value: &[u8],
    ) -> RedbStoreResult<Option<Vec<u8>>> {
        let write_txn = self.db.begin_write()?;
        let existing = {
            let mut table = write_txn.open_table(table_def)?;
            // Read, then drop the guard before mutating
            let existing = table.get(key)?.map(|v| v.value().to_vec());
            if existing.is_none() {
                table.insert(key, value)?;
            }
            existing
        };
        if existing.is_none() {
            write_txn.commit()?;
        }
        Ok(existing)
    }

    fn keys_with_prefix(&self, table_def: Table, prefix: &str) -> RedbStoreResult<Vec<CacheKey>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table_def)?;
        let mut result = Vec::new();
        // Keys sort lexicographically, so a directory's keys are contiguous
        for entry in table.range(prefix..)? {
            let entry = entry?;
            let raw = entry.0.value();
            if !raw.starts_with(prefix) {
                break;
            }
            match Self::decode_key(table_def, raw) {
                Ok(key) => result.push(key),
                Err(e) => error!("Skipping undecodable key in '{}': {}", table_def.name(), e),
            }
        }
        Ok(result)
    }
}

impl KeyValueStore for RedbStore {
    fn get(&self, key: &CacheKey) -> StoreResult<Option<CacheValue>> {
        let (table, raw) = Self::encode_key(key);
        match self.get_bytes(table, &raw)? {
            Some(bytes) => Ok(Some(Self::decode_value(key, &bytes)?)),
            None => Ok(None),
        }
    }

    fn put(&self, key: CacheKey, value: CacheValue) -> StoreResult<()> {
        let (table, raw) = Self::encode_key(&key);
        let bytes = Self::encode_value(&value)?;
        Ok(self.put_bytes(table, &raw, &bytes)?)
    }

    fn remove(&self, key: &CacheKey) -> StoreResult<()> {
        let (table, raw) = Self::encode_key(key);
        Ok(self.delete_key(table, &raw)?)
    }

    fn put_if_absent(&self, key: CacheKey, value: CacheValue) -> StoreResult<Option<CacheValue>> {
        let (table, raw) = Self::encode_key(&key);
        let bytes = Self::encode_value(&value)?;
        match self.insert_if_absent(table, &raw, &bytes)? {
            Some(existing) => Ok(Some(Self::decode_value(&key, &existing)?)),
            None => Ok(None),
        }
    }

    fn keys(&self, directory: &str) -> StoreResult<Vec<CacheKey>> {
        let prefix = format!("{directory}{SEP}");
        let mut keys = Vec::new();
        for table in [tables::FILES, tables::CHUNKS, tables::LOCKS] {
            keys.extend(self.keys_with_prefix(table, &prefix)?);
        }
        Ok(keys)
    }
}
