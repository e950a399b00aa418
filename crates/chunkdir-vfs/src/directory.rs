//! Directory of chunked files
//!
//! A [`Directory`] is a namespace of named files inside a shared key-value
//! store. Each file is one metadata entry plus `ceil(size / chunk_size)`
//! chunk entries.
//!
//! Multi-key operations (delete, rename, writer close) run as ordered
//! sequences of single-key store calls. A failure part-way through is
//! returned to the caller and nothing is rolled back, so the store may be
//! left holding a mix of old and new keys.

use crate::chunk::{ChunkMapper, fetch_chunk};
use crate::lock::DirectoryLock;
use crate::reader::ChunkReader;
use crate::writer::ChunkWriter;
use bytes::Bytes;
use chunkdir_common::{
    CacheKey, CacheValue, DEFAULT_CHUNK_SIZE, DirectoryConfig, Error, FileKey, FileMetadata,
    LockKey, Result, validate_directory_name,
};
use chunkdir_store::KeyValueStore;
use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Read a file's metadata record, if any
pub(crate) fn read_metadata(store: &dyn KeyValueStore, key: &FileKey) -> Result<Option<FileMetadata>> {
    match store.get(&CacheKey::File(key.clone()))? {
        Some(CacheValue::Metadata(meta)) => Ok(Some(meta)),
        Some(other) => Err(Error::corrupt(
            key,
            format!("expected metadata, found {}", other.kind()),
        )),
        None => Ok(None),
    }
}

/// File-system-like view over one namespace of a key-value store
pub struct Directory {
    store: Arc<dyn KeyValueStore>,
    name: String,
    mapper: ChunkMapper,
    closed: AtomicBool,
}

impl Directory {
    /// Open a directory with the default chunk size
    pub fn new(store: Arc<dyn KeyValueStore>, name: impl Into<String>) -> Result<Self> {
        Self::with_chunk_size(store, name, DEFAULT_CHUNK_SIZE)
    }

    /// Open a directory with a custom chunk size
    pub fn with_chunk_size(
        store: Arc<dyn KeyValueStore>,
        name: impl Into<String>,
        chunk_size: usize,
    ) -> Result<Self> {
        let name = name.into();
        validate_directory_name(&name)?;
        if chunk_size == 0 {
            return Err(Error::invalid_argument("chunk size must be positive"));
        }
        debug!(directory = %name, chunk_size, "Opened directory");
        Ok(Self {
            store,
            name,
            mapper: ChunkMapper::new(chunk_size as u64),
            closed: AtomicBool::new(false),
        })
    }

    /// Open a directory as described by `config`
    pub fn from_config(store: Arc<dyn KeyValueStore>, config: &DirectoryConfig) -> Result<Self> {
        config.validate()?;
        Self::with_chunk_size(store, config.name.clone(), config.chunk_size)
    }

    /// Directory name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Chunk size in bytes
    pub fn chunk_size(&self) -> usize {
        // Constructed from a usize
        self.mapper.chunk_size() as usize
    }

    /// Names of all files in this directory
    pub fn list(&self) -> Result<BTreeSet<String>> {
        self.ensure_open()?;
        let names = self
            .store
            .keys(&self.name)?
            .into_iter()
            .filter_map(|key| match key {
                CacheKey::File(k) => Some(k.file),
                _ => None,
            })
            .collect();
        Ok(names)
    }

    /// Whether `name` has a metadata record
    pub fn file_exists(&self, name: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.metadata(name)?.is_some())
    }

    /// Length of `name` in bytes
    pub fn file_length(&self, name: &str) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.require_metadata(name)?.size)
    }

    /// Last modification time of `name` (unix milliseconds)
    pub fn file_modified(&self, name: &str) -> Result<i64> {
        self.ensure_open()?;
        Ok(self.require_metadata(name)?.last_modified)
    }

    /// Set the modification time of `name` to now
    pub fn touch_file(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let mut meta = self.require_metadata(name)?;
        meta.touch();
        self.store
            .put(self.file_key(name).into(), CacheValue::Metadata(meta))?;
        Ok(())
    }

    /// Open `name` for reading
    ///
    /// The returned reader sees the file length as of this call.
    pub fn open_input(&self, name: &str) -> Result<ChunkReader> {
        self.ensure_open()?;
        let meta = self.require_metadata(name)?;
        debug!(directory = %self.name, file = name, size = meta.size, "Open input");
        Ok(ChunkReader::new(
            self.store.clone(),
            self.file_key(name),
            self.mapper,
            meta.size,
        ))
    }

    /// Create `name` for writing, superseding any existing file
    ///
    /// The file exists (with size 0) as soon as this returns. Chunks of a
    /// superseded file beyond the new length are pruned when the writer
    /// closes.
    pub fn create_output(&self, name: &str) -> Result<ChunkWriter> {
        self.ensure_open()?;
        let key = self.file_key(name);
        let counted = self
            .metadata(name)?
            .map_or(0, |m| self.mapper.chunks_for_size(m.size));
        // Chunks left by a writer dropped before close are not counted
        let stale_chunks = self
            .stored_chunks(&key)?
            .into_iter()
            .map(|i| i + 1)
            .fold(counted, u64::max);
        self.store
            .put(key.clone().into(), CacheValue::Metadata(FileMetadata::new()))?;
        debug!(directory = %self.name, file = name, stale_chunks, "Create output");
        Ok(ChunkWriter::new(
            self.store.clone(),
            key,
            self.mapper,
            stale_chunks,
        ))
    }

    /// Delete `name`; deleting a missing file is a no-op
    ///
    /// Chunks are removed before the metadata, so a concurrent reader that
    /// still finds the metadata can only miss chunks, never see a file whose
    /// metadata outlives a complete delete.
    pub fn delete_file(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let Some(meta) = self.metadata(name)? else {
            debug!(directory = %self.name, file = name, "Delete of missing file ignored");
            return Ok(());
        };
        let key = self.file_key(name);
        self.purge_chunks(&key, 0..self.mapper.chunks_for_size(meta.size))?;
        self.store.remove(&key.into())?;
        debug!(directory = %self.name, file = name, size = meta.size, "Deleted file");
        Ok(())
    }

    /// Rename `from` to `to`, replacing any existing `to`
    ///
    /// All source chunks are read before anything is written; then the
    /// chunks and metadata are copied under `to` and the source keys are
    /// removed exactly as [`delete_file`](Self::delete_file) would.
    pub fn rename_file(&self, from: &str, to: &str) -> Result<()> {
        self.ensure_open()?;
        let meta = self.require_metadata(from)?;
        if from == to {
            return Ok(());
        }

        let src = self.file_key(from);
        let dst = self.file_key(to);
        let count = self.mapper.chunks_for_size(meta.size);
        let chunks: Vec<Bytes> = (0..count)
            .map(|i| fetch_chunk(self.store.as_ref(), &src.chunk(i)))
            .collect::<Result<_>>()?;
        let displaced = self
            .metadata(to)?
            .map_or(0, |m| self.mapper.chunks_for_size(m.size));

        for (i, bytes) in (0..count).zip(chunks) {
            self.store.put(
                dst.chunk(i).into(),
                CacheValue::Chunk(bytes),
            )?;
        }
        self.store
            .put(dst.clone().into(), CacheValue::Metadata(meta))?;
        self.purge_chunks(&dst, count..displaced)?;

        self.purge_chunks(&src, 0..count)?;
        self.store.remove(&src.into())?;
        debug!(directory = %self.name, from, to, chunks = count, "Renamed file");
        Ok(())
    }

    /// Handle to the named lock `name`
    pub fn make_lock(&self, name: &str) -> Result<DirectoryLock> {
        self.ensure_open()?;
        Ok(DirectoryLock::new(
            self.store.clone(),
            LockKey::new(self.name.clone(), name),
        ))
    }

    /// Forcibly remove the named lock `name`
    pub fn clear_lock(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        self.store
            .remove(&LockKey::new(self.name.clone(), name).into())?;
        Ok(())
    }

    /// Close the directory; later operations fail with `AlreadyClosed`
    ///
    /// Readers and writers already handed out keep working. The store is
    /// left untouched.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(directory = %self.name, "Closed directory");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::AlreadyClosed(self.name.clone()));
        }
        Ok(())
    }

    fn file_key(&self, name: &str) -> FileKey {
        FileKey::new(self.name.clone(), name)
    }

    fn metadata(&self, name: &str) -> Result<Option<FileMetadata>> {
        read_metadata(self.store.as_ref(), &self.file_key(name))
    }

    fn require_metadata(&self, name: &str) -> Result<FileMetadata> {
        self.metadata(name)?
            .ok_or_else(|| Error::not_found(self.name.clone(), name))
    }

    /// Indices of every chunk stored for `file`, whatever its metadata says
    fn stored_chunks(&self, file: &FileKey) -> Result<Vec<u64>> {
        let indices = self
            .store
            .keys(&self.name)?
            .into_iter()
            .filter_map(|key| match key {
                CacheKey::Chunk(k) if k.file == file.file => Some(k.index),
                _ => None,
            })
            .collect();
        Ok(indices)
    }

    /// Remove the `counted` chunks of `file`, then any stored chunk at or
    /// beyond `counted.start` that the metadata no longer accounts for
    fn purge_chunks(&self, file: &FileKey, counted: Range<u64>) -> Result<()> {
        let start = counted.start;
        for i in counted {
            self.store.remove(&file.chunk(i).into())?;
        }
        for i in self.stored_chunks(file)? {
            if i >= start {
                debug!(chunk = %file.chunk(i), "Removing orphaned chunk");
                self.store.remove(&file.chunk(i).into())?;
            }
        }
        Ok(())
    }
}
