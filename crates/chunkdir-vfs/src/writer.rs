//! Chunked file writer
//!
//! Buffers one chunk at a time and flushes every chunk that fills to the
//! store. File size and metadata are only committed by [`ChunkWriter::close`].

use crate::chunk::{ChunkId, ChunkMapper, fetch_chunk};
use crate::directory::read_metadata;
use bytes::Bytes;
use chunkdir_common::{CacheKey, CacheValue, FileKey, Result};
use chunkdir_store::KeyValueStore;
use std::fmt;
use std::io;
use std::sync::Arc;
use tracing::{debug, warn};

/// Zero-fill granularity when seeking past the end of the file
const ZERO_FILL: [u8; 4096] = [0u8; 4096];

/// Sequential byte sink over a chunked file
///
/// The writer holds a single chunk in memory. Moving into a chunk that
/// already holds data written by this writer (via [`seek`](Self::seek) or by
/// crossing a chunk boundary) reloads that chunk, so bytes that are not
/// overwritten survive.
///
/// Final file length is the greatest offset ever written. Rewriting a
/// shorter prefix after `seek(0)` keeps the old tail.
///
/// Concurrent writers on the same file race on chunk flushes and on the
/// final metadata write; callers must serialize them.
pub struct ChunkWriter {
    store: Arc<dyn KeyValueStore>,
    key: FileKey,
    mapper: ChunkMapper,
    /// Chunk currently held in `buffer`
    chunk_id: ChunkId,
    /// Content of chunk `chunk_id` written or loaded so far
    buffer: Vec<u8>,
    /// Write cursor within `buffer`
    position: usize,
    /// Greatest offset reached by any write
    length: u64,
    /// Chunk count of the file this writer superseded; pruned at close
    stale_chunks: u64,
    /// Buffer holds bytes not yet flushed to the store
    buffer_dirty: bool,
    /// Something changed since the last close
    pending: bool,
}

impl ChunkWriter {
    pub(crate) fn new(
        store: Arc<dyn KeyValueStore>,
        key: FileKey,
        mapper: ChunkMapper,
        stale_chunks: u64,
    ) -> Self {
        Self {
            store,
            key,
            mapper,
            chunk_id: 0,
            buffer: Vec::new(),
            position: 0,
            length: 0,
            stale_chunks,
            buffer_dirty: false,
            // A fresh writer must commit even if nothing is written, so the
            // superseded file's chunks get pruned.
            pending: true,
        }
    }

    /// Name of the file being written
    pub fn name(&self) -> &str {
        &self.key.file
    }

    /// Absolute offset of the write cursor
    pub fn file_pointer(&self) -> u64 {
        self.mapper.chunk_start(self.chunk_id) + self.position as u64
    }

    /// Current file length (greatest offset written so far)
    pub const fn length(&self) -> u64 {
        self.length
    }

    /// Write a single byte at the cursor
    pub fn write_byte(&mut self, b: u8) -> Result<()> {
        self.write_bytes(&[b])
    }

    /// Write `data` at the cursor, flushing every chunk that fills
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        let chunk_size = self.chunk_size();
        let mut remaining = data;

        while !remaining.is_empty() {
            if self.position == chunk_size {
                // An earlier rollover failed part-way
                self.flush_buffer()?;
                self.enter_chunk(self.chunk_id + 1)?;
            }
            let n = (chunk_size - self.position).min(remaining.len());
            let end = self.position + n;
            if self.buffer.len() < end {
                self.buffer.resize(end, 0);
            }
            self.buffer[self.position..end].copy_from_slice(&remaining[..n]);
            self.position = end;
            self.buffer_dirty = true;
            self.pending = true;
            self.length = self.length.max(self.file_pointer());
            remaining = &remaining[n..];

            if self.position == chunk_size {
                self.flush_buffer()?;
                self.enter_chunk(self.chunk_id + 1)?;
            }
        }
        Ok(())
    }

    /// Move the cursor to absolute offset `pos`
    ///
    /// Seeking past the current length zero-fills the gap so every chunk
    /// below the length stays present. The fill counts as written: a seek
    /// past the end followed by `close` commits a file padded with zeros up
    /// to `pos`, even with no write after the seek.
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.length {
            self.move_to(self.length)?;
            let mut gap = pos - self.length;
            while gap > 0 {
                let n = usize::try_from(gap).map_or(ZERO_FILL.len(), |g| g.min(ZERO_FILL.len()));
                self.write_bytes(&ZERO_FILL[..n])?;
                gap -= n as u64;
            }
            return Ok(());
        }
        self.move_to(pos)
    }

    /// Flush the chunk buffer, commit file metadata and prune stale chunks
    ///
    /// Closing again without intervening writes is a no-op. The writer stays
    /// usable: a later seek/write/close cycle commits again.
    pub fn close(&mut self) -> Result<()> {
        if !self.pending {
            return Ok(());
        }
        self.flush_buffer()?;

        let file_key = CacheKey::File(self.key.clone());
        let mut meta = read_metadata(self.store.as_ref(), &self.key)?.unwrap_or_default();
        meta.size = self.length;
        meta.touch();
        self.store.put(file_key, CacheValue::Metadata(meta))?;

        let live = self.mapper.chunks_for_size(self.length);
        if self.stale_chunks > live {
            debug!(
                file = %self.key,
                from = live,
                to = self.stale_chunks,
                "Pruning superseded chunks"
            );
            for chunk_id in live..self.stale_chunks {
                let key = self.key.chunk(chunk_id);
                self.store.remove(&CacheKey::Chunk(key))?;
            }
        }
        self.stale_chunks = live;
        self.pending = false;

        debug!(file = %self.key, size = self.length, "Closed writer");
        Ok(())
    }

    fn chunk_size(&self) -> usize {
        // Chunk sizes come from a usize config value
        usize::try_from(self.mapper.chunk_size()).unwrap_or(usize::MAX)
    }

    fn move_to(&mut self, pos: u64) -> Result<()> {
        let target = self.mapper.byte_offset_to_chunk_id(pos);
        if target != self.chunk_id {
            self.flush_buffer()?;
            self.enter_chunk(target)?;
        }
        // Bounded by the chunk size, which fits in usize
        self.position = self.mapper.offset_in_chunk(pos) as usize;
        Ok(())
    }

    /// Make `chunk_id` the buffered chunk with the cursor at its start,
    /// loading its bytes if it lies below the current length.
    ///
    /// On a failed load the writer keeps its previous chunk and cursor.
    fn enter_chunk(&mut self, chunk_id: ChunkId) -> Result<()> {
        let loaded = if self.mapper.chunk_start(chunk_id) < self.length {
            Some(fetch_chunk(self.store.as_ref(), &self.key.chunk(chunk_id))?)
        } else {
            None
        };
        self.buffer.clear();
        if let Some(bytes) = loaded {
            self.buffer.extend_from_slice(&bytes);
        }
        self.chunk_id = chunk_id;
        self.position = 0;
        Ok(())
    }

    fn flush_buffer(&mut self) -> Result<()> {
        if !self.buffer_dirty {
            return Ok(());
        }
        let key = self.key.chunk(self.chunk_id);
        debug!(chunk = %key, len = self.buffer.len(), "Flushing chunk");
        self.store.put(
            CacheKey::Chunk(key),
            CacheValue::Chunk(Bytes::copy_from_slice(&self.buffer)),
        )?;
        self.buffer_dirty = false;
        Ok(())
    }
}

impl fmt::Debug for ChunkWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkWriter")
            .field("key", &self.key)
            .field("length", &self.length)
            .field("file_pointer", &self.file_pointer())
            .finish_non_exhaustive()
    }
}

impl Drop for ChunkWriter {
    fn drop(&mut self) {
        if self.pending && (self.buffer_dirty || self.length > 0) {
            warn!(
                file = %self.key,
                length = self.length,
                "Writer dropped without close; metadata not committed"
            );
        }
    }
}

impl io::Write for ChunkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.flush_buffer()?)
    }
}

impl io::Seek for ChunkWriter {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let target = match pos {
            io::SeekFrom::Start(p) => Some(p),
            io::SeekFrom::End(d) => self.length.checked_add_signed(d),
            io::SeekFrom::Current(d) => self.file_pointer().checked_add_signed(d),
        }
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file"))?;
        ChunkWriter::seek(self, target)?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkdir_common::{ChunkKey, Error, FileMetadata};
    use chunkdir_store::MemoryStore;

    fn writer(store: &Arc<MemoryStore>, chunk_size: u64) -> ChunkWriter {
        let store: Arc<dyn KeyValueStore> = store.clone();
        ChunkWriter::new(store, FileKey::new("index", "f"), ChunkMapper::new(chunk_size), 0)
    }

    fn chunk(store: &MemoryStore, index: u64) -> Option<Vec<u8>> {
        store
            .get(&ChunkKey::new("index", "f", index).into())
            .unwrap()
            .and_then(CacheValue::into_chunk)
            .map(|b| b.to_vec())
    }

    fn size(store: &MemoryStore) -> u64 {
        store
            .get(&FileKey::new("index", "f").into())
            .unwrap()
            .and_then(CacheValue::into_metadata)
            .unwrap()
            .size
    }

    #[test]
    fn test_write_byte_flushes_full_chunks() {
        let store = Arc::new(MemoryStore::new());
        let mut w = writer(&store, 4);

        for b in 0..9u8 {
            w.write_byte(b).unwrap();
        }
        // Two full chunks flushed, third still buffered
        assert_eq!(chunk(&store, 0), Some(vec![0, 1, 2, 3]));
        assert_eq!(chunk(&store, 1), Some(vec![4, 5, 6, 7]));
        assert_eq!(chunk(&store, 2), None);

        w.close().unwrap();
        assert_eq!(chunk(&store, 2), Some(vec![8]));
        assert_eq!(size(&store), 9);
    }

    #[test]
    fn test_write_bytes_crosses_boundaries() {
        let store = Arc::new(MemoryStore::new());
        let mut w = writer(&store, 4);

        w.write_bytes(&[1, 2]).unwrap();
        w.write_bytes(&[3, 4, 5, 6, 7, 8, 9, 10, 11]).unwrap();
        assert_eq!(w.file_pointer(), 11);
        w.close().unwrap();

        assert_eq!(chunk(&store, 0), Some(vec![1, 2, 3, 4]));
        assert_eq!(chunk(&store, 1), Some(vec![5, 6, 7, 8]));
        assert_eq!(chunk(&store, 2), Some(vec![9, 10, 11]));
        assert_eq!(size(&store), 11);
    }

    #[test]
    fn test_exact_multiple_has_no_empty_trailing_chunk() {
        let store = Arc::new(MemoryStore::new());
        let mut w = writer(&store, 4);
        w.write_bytes(&[7; 8]).unwrap();
        w.close().unwrap();

        assert_eq!(size(&store), 8);
        assert!(chunk(&store, 1).is_some());
        assert!(chunk(&store, 2).is_none());
    }

    #[test]
    fn test_seek_back_preserves_unwritten_bytes() {
        let store = Arc::new(MemoryStore::new());
        let mut w = writer(&store, 4);
        w.write_bytes(b"abcdefghij").unwrap();

        w.seek(1).unwrap();
        w.write_bytes(b"XY").unwrap();
        w.seek(5).unwrap();
        w.write_byte(b'Z').unwrap();
        w.close().unwrap();

        assert_eq!(chunk(&store, 0), Some(b"aXYd".to_vec()));
        assert_eq!(chunk(&store, 1), Some(b"eZgh".to_vec()));
        assert_eq!(chunk(&store, 2), Some(b"ij".to_vec()));
        assert_eq!(size(&store), 10);
    }

    #[test]
    fn test_shorter_rewrite_keeps_high_water_length() {
        let store = Arc::new(MemoryStore::new());
        let mut w = writer(&store, 4);
        w.write_bytes(b"0123456789").unwrap();
        w.close().unwrap();

        w.seek(0).unwrap();
        w.write_bytes(b"ab").unwrap();
        w.close().unwrap();

        assert_eq!(size(&store), 10);
        assert_eq!(chunk(&store, 0), Some(b"ab23".to_vec()));
        assert_eq!(chunk(&store, 2), Some(b"89".to_vec()));
    }

    #[test]
    fn test_seek_past_end_zero_fills() {
        let store = Arc::new(MemoryStore::new());
        let mut w = writer(&store, 4);
        w.write_bytes(b"ab").unwrap();
        w.seek(9).unwrap();
        w.write_byte(b'z').unwrap();
        w.close().unwrap();

        assert_eq!(size(&store), 10);
        assert_eq!(chunk(&store, 0), Some(vec![b'a', b'b', 0, 0]));
        assert_eq!(chunk(&store, 1), Some(vec![0; 4]));
        assert_eq!(chunk(&store, 2), Some(vec![0, b'z']));
    }

    #[test]
    fn test_seek_past_end_then_close_pads_file() {
        let store = Arc::new(MemoryStore::new());
        let mut w = writer(&store, 4);
        w.write_bytes(b"ab").unwrap();
        w.seek(6).unwrap();
        assert_eq!(w.length(), 6);
        w.close().unwrap();

        assert_eq!(size(&store), 6);
        assert_eq!(chunk(&store, 0), Some(vec![b'a', b'b', 0, 0]));
        assert_eq!(chunk(&store, 1), Some(vec![0, 0]));
    }

    #[test]
    fn test_missing_chunk_on_reload_keeps_cursor() {
        let store = Arc::new(MemoryStore::new());
        let mut w = writer(&store, 4);
        w.write_bytes(b"abcdefghijkl").unwrap();
        w.close().unwrap();

        let saved = store.get(&ChunkKey::new("index", "f", 1).into()).unwrap().unwrap();
        store.remove(&ChunkKey::new("index", "f", 1).into()).unwrap();

        w.seek(0).unwrap();
        let err = w.write_bytes(b"XXXX").unwrap_err();
        assert!(matches!(err, Error::CorruptState { .. }), "got {err}");
        assert_eq!(w.file_pointer(), 4);

        store.put(ChunkKey::new("index", "f", 1).into(), saved).unwrap();
        w.write_byte(b'Y').unwrap();
        assert_eq!(w.file_pointer(), 5);
        w.close().unwrap();

        assert_eq!(chunk(&store, 0), Some(b"XXXX".to_vec()));
        assert_eq!(chunk(&store, 1), Some(b"Yfgh".to_vec()));
        assert_eq!(chunk(&store, 2), Some(b"ijkl".to_vec()));
        assert_eq!(size(&store), 12);
    }

    #[test]
    fn test_double_close_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let mut w = writer(&store, 4);
        w.write_bytes(b"abc").unwrap();
        w.close().unwrap();

        // Tamper with the metadata; a second close must not rewrite it
        store
            .put(
                FileKey::new("index", "f").into(),
                CacheValue::Metadata(FileMetadata::with_size(1)),
            )
            .unwrap();
        w.close().unwrap();
        assert_eq!(size(&store), 1);
    }

    #[test]
    fn test_close_prunes_superseded_chunks() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..5 {
            store
                .put(
                    ChunkKey::new("index", "f", i).into(),
                    CacheValue::Chunk(Bytes::from_static(b"old!")),
                )
                .unwrap();
        }
        let dyn_store: Arc<dyn KeyValueStore> = store.clone();
        let mut w = ChunkWriter::new(dyn_store, FileKey::new("index", "f"), ChunkMapper::new(4), 5);
        w.write_bytes(b"new").unwrap();
        w.close().unwrap();

        assert_eq!(chunk(&store, 0), Some(b"new".to_vec()));
        for i in 1..5 {
            assert!(chunk(&store, i).is_none(), "chunk {i} should be pruned");
        }
        assert_eq!(size(&store), 3);
    }

    #[test]
    fn test_io_write_and_seek() {
        use std::io::{Seek, SeekFrom, Write};

        let store = Arc::new(MemoryStore::new());
        let mut w = writer(&store, 4);
        w.write_all(b"hello world").unwrap();
        assert_eq!(Seek::seek(&mut w, SeekFrom::End(-5)).unwrap(), 6);
        w.write_all(b"WORLD").unwrap();
        assert!(Seek::seek(&mut w, SeekFrom::Current(-100)).is_err());
        w.close().unwrap();

        let mut content = Vec::new();
        for i in 0..3 {
            content.extend(chunk(&store, i).unwrap());
        }
        assert_eq!(content, b"hello WORLD");
    }
}
