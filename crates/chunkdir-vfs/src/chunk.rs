//! Chunk mapping for directory files
//!
//! Maps byte offsets within a file to the chunk keys holding them.

use bytes::Bytes;
use chunkdir_common::{CacheKey, CacheValue, ChunkKey, DEFAULT_CHUNK_SIZE, Error, Result};
use chunkdir_store::KeyValueStore;

/// Chunk index within a file
pub type ChunkId = u64;

/// A range of bytes within a chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRange {
    /// Chunk index
    pub chunk_id: ChunkId,
    /// Byte offset within the chunk
    pub offset_in_chunk: u64,
    /// Number of bytes in this range
    pub length: u64,
}

/// Maps file offsets to chunks
///
/// Files are divided into fixed-size chunks. Each chunk is stored under its
/// own key in the directory's store.
///
/// ```text
/// File "segments_1" (size 106, chunk size 64)
/// ├── Chunk 0:  bytes 0 - 64     → index/segments_1#0
/// └── Chunk 1:  bytes 64 - 106   → index/segments_1#1
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ChunkMapper {
    /// Chunk size in bytes
    chunk_size: u64,
}

impl Default for ChunkMapper {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE as u64)
    }
}

impl ChunkMapper {
    /// Create a new chunk mapper with the specified chunk size
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero.
    pub fn new(chunk_size: u64) -> Self {
        assert!(chunk_size > 0, "Chunk size must be positive");
        Self { chunk_size }
    }

    /// Get the chunk size
    pub const fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Convert a byte offset to a chunk ID
    pub const fn byte_offset_to_chunk_id(&self, byte_offset: u64) -> ChunkId {
        byte_offset / self.chunk_size
    }

    /// Offset of `byte_offset` within its chunk
    pub const fn offset_in_chunk(&self, byte_offset: u64) -> u64 {
        byte_offset % self.chunk_size
    }

    /// First byte offset covered by a chunk
    pub const fn chunk_start(&self, chunk_id: ChunkId) -> u64 {
        chunk_id * self.chunk_size
    }

    /// Convert a byte range to chunk ranges
    ///
    /// Returns a list of chunk ranges that cover the specified byte range.
    /// Handles ranges that span multiple chunks.
    pub fn byte_range_to_chunks(&self, start_byte: u64, length: u64) -> Vec<ChunkRange> {
        if length == 0 {
            return Vec::new();
        }

        let end_byte = start_byte + length;
        let start_chunk = start_byte / self.chunk_size;
        let end_chunk = (end_byte - 1) / self.chunk_size;

        (start_chunk..=end_chunk)
            .map(|chunk_id| {
                let chunk_start = chunk_id * self.chunk_size;
                let chunk_end = chunk_start + self.chunk_size;

                // Intersection of [start_byte, end_byte) and [chunk_start, chunk_end)
                let range_start = start_byte.max(chunk_start);
                let range_end = end_byte.min(chunk_end);

                ChunkRange {
                    chunk_id,
                    offset_in_chunk: range_start - chunk_start,
                    length: range_end - range_start,
                }
            })
            .collect()
    }

    /// Calculate the number of chunks needed for a file of the given size
    pub const fn chunks_for_size(&self, size_bytes: u64) -> u64 {
        size_bytes.div_ceil(self.chunk_size)
    }
}

/// Fetch a chunk that the file's metadata says must exist
///
/// A missing key, or a key holding something other than a chunk, means a
/// concurrent delete/rename or an inconsistent store.
pub(crate) fn fetch_chunk(store: &dyn KeyValueStore, key: &ChunkKey) -> Result<Bytes> {
    match store.get(&CacheKey::Chunk(key.clone()))? {
        Some(CacheValue::Chunk(bytes)) => Ok(bytes),
        Some(other) => Err(Error::corrupt(
            key,
            format!("expected chunk, found {}", other.kind()),
        )),
        None => Err(Error::corrupt(key, "chunk missing")),
    }
}
