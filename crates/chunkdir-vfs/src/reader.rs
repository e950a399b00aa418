//! Chunked file reader

use crate::chunk::{ChunkId, ChunkMapper, fetch_chunk};
use bytes::Bytes;
use chunkdir_common::{Error, FileKey, Result};
use chunkdir_store::KeyValueStore;
use std::fmt;
use std::io;
use std::sync::Arc;

/// Random-access byte source over a chunked file
///
/// The length is captured when the file is opened and never changes, even
/// if another writer later grows or shrinks the file. Chunks are loaded on
/// first access and only the most recently used one is cached, so a chunk
/// overwritten before it is first read is observed in its new form.
///
/// Cloning yields an independent cursor over the same snapshot.
#[derive(Clone)]
pub struct ChunkReader {
    store: Arc<dyn KeyValueStore>,
    key: FileKey,
    mapper: ChunkMapper,
    length: u64,
    position: u64,
    cached: Option<(ChunkId, Bytes)>,
}

impl ChunkReader {
    pub(crate) fn new(
        store: Arc<dyn KeyValueStore>,
        key: FileKey,
        mapper: ChunkMapper,
        length: u64,
    ) -> Self {
        Self {
            store,
            key,
            mapper,
            length,
            position: 0,
            cached: None,
        }
    }

    /// Name of the file being read
    pub fn name(&self) -> &str {
        &self.key.file
    }

    /// File length captured at open
    pub const fn length(&self) -> u64 {
        self.length
    }

    /// Absolute offset of the read cursor
    pub const fn file_pointer(&self) -> u64 {
        self.position
    }

    /// Read the byte at the cursor and advance
    pub fn read_byte(&mut self) -> Result<u8> {
        self.check_remaining(1)?;
        let chunk_id = self.mapper.byte_offset_to_chunk_id(self.position);
        let offset = self.mapper.offset_in_chunk(self.position);
        let chunk = self.load(chunk_id)?;
        let byte = usize::try_from(offset)
            .ok()
            .and_then(|o| chunk.get(o).copied())
            .ok_or_else(|| self.short_chunk(chunk_id, chunk.len()))?;
        self.position += 1;
        Ok(byte)
    }

    /// Fill `buf` from the cursor and advance past it
    ///
    /// Fails with `EndOfFile`, without reading anything, if fewer than
    /// `buf.len()` bytes remain.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        let len = buf.len() as u64;
        self.check_remaining(len)?;

        let mut copied = 0usize;
        for range in self.mapper.byte_range_to_chunks(self.position, len) {
            let chunk = self.load(range.chunk_id)?;
            let start = range.offset_in_chunk as usize;
            let end = start + range.length as usize;
            let src = chunk
                .get(start..end)
                .ok_or_else(|| self.short_chunk(range.chunk_id, chunk.len()))?;
            buf[copied..copied + src.len()].copy_from_slice(src);
            copied += src.len();
            self.position += range.length;
        }
        Ok(())
    }

    /// Move the cursor to absolute offset `pos`
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.length {
            return Err(Error::EndOfFile {
                file: self.key.to_string(),
                position: pos,
                requested: 0,
                length: self.length,
            });
        }
        self.position = pos;
        Ok(())
    }

    /// Release the cached chunk
    pub fn close(&mut self) {
        self.cached = None;
    }

    fn check_remaining(&self, requested: u64) -> Result<()> {
        if self.position + requested > self.length {
            return Err(Error::EndOfFile {
                file: self.key.to_string(),
                position: self.position,
                requested,
                length: self.length,
            });
        }
        Ok(())
    }

    fn load(&mut self, chunk_id: ChunkId) -> Result<Bytes> {
        if let Some((cached_id, bytes)) = &self.cached
            && *cached_id == chunk_id
        {
            return Ok(bytes.clone());
        }
        let key = self.key.chunk(chunk_id);
        let bytes = fetch_chunk(self.store.as_ref(), &key)?;
        self.cached = Some((chunk_id, bytes.clone()));
        Ok(bytes)
    }

    fn short_chunk(&self, chunk_id: ChunkId, actual: usize) -> Error {
        Error::corrupt(
            self.key.chunk(chunk_id),
            format!("chunk holds {actual} bytes, file length {} needs more", self.length),
        )
    }
}

impl fmt::Debug for ChunkReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkReader")
            .field("key", &self.key)
            .field("length", &self.length)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl io::Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.length - self.position;
        let n = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
        self.read_bytes(&mut buf[..n])?;
        Ok(n)
    }
}

impl io::Seek for ChunkReader {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let target = match pos {
            io::SeekFrom::Start(p) => Some(p),
            io::SeekFrom::End(d) => self.length.checked_add_signed(d),
            io::SeekFrom::Current(d) => self.position.checked_add_signed(d),
        }
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file"))?;
        ChunkReader::seek(self, target)?;
        Ok(target)
    }
}
