//! File I/O contract
//!
//! The narrow interface a search-index engine needs from its storage: a
//! random-access input, a sequential output, and a directory of named
//! files. [`Directory`], [`ChunkReader`] and [`ChunkWriter`] implement it;
//! code written against these traits can run over any implementation.

use crate::directory::Directory;
use crate::reader::ChunkReader;
use crate::writer::ChunkWriter;
use chunkdir_common::Result;
use std::collections::BTreeSet;

/// Random-access byte source
pub trait FileInput {
    /// Total length in bytes
    fn length(&self) -> u64;

    /// Read one byte at the cursor
    fn read_byte(&mut self) -> Result<u8>;

    /// Fill `buf` from the cursor
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()>;

    fn close(&mut self);
}

/// Sequential byte sink with repositioning
pub trait FileOutput {
    fn write_byte(&mut self, b: u8) -> Result<()>;

    fn write_bytes(&mut self, data: &[u8]) -> Result<()>;

    /// Move the cursor to absolute offset `pos`
    fn seek(&mut self, pos: u64) -> Result<()>;

    /// Commit everything written so far
    fn close(&mut self) -> Result<()>;
}

/// Namespace of named files
pub trait FileDirectory {
    type Input: FileInput;
    type Output: FileOutput;

    fn list(&self) -> Result<BTreeSet<String>>;

    fn file_exists(&self, name: &str) -> Result<bool>;

    fn open_input(&self, name: &str) -> Result<Self::Input>;

    fn create_output(&self, name: &str) -> Result<Self::Output>;

    fn delete_file(&self, name: &str) -> Result<()>;

    fn rename_file(&self, from: &str, to: &str) -> Result<()>;
}

impl FileInput for ChunkReader {
    fn length(&self) -> u64 {
        Self::length(self)
    }

    fn read_byte(&mut self) -> Result<u8> {
        Self::read_byte(self)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        Self::read_bytes(self, buf)
    }

    fn close(&mut self) {
        Self::close(self);
    }
}

impl FileOutput for ChunkWriter {
    fn write_byte(&mut self, b: u8) -> Result<()> {
        Self::write_byte(self, b)
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        Self::write_bytes(self, data)
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        Self::seek(self, pos)
    }

    fn close(&mut self) -> Result<()> {
        Self::close(self)
    }
}

impl FileDirectory for Directory {
    type Input = ChunkReader;
    type Output = ChunkWriter;

    fn list(&self) -> Result<BTreeSet<String>> {
        Self::list(self)
    }

    fn file_exists(&self, name: &str) -> Result<bool> {
        Self::file_exists(self, name)
    }

    fn open_input(&self, name: &str) -> Result<ChunkReader> {
        Self::open_input(self, name)
    }

    fn create_output(&self, name: &str) -> Result<ChunkWriter> {
        Self::create_output(self, name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        Self::delete_file(self, name)
    }

    fn rename_file(&self, from: &str, to: &str) -> Result<()> {
        Self::rename_file(self, from, to)
    }
}

/// Copy buffer size for [`copy_file`]
const COPY_BUFFER: usize = 8 * 1024;

/// Copy `src` to `dst` within `dir` through the contract traits
///
/// Returns the number of bytes copied.
pub fn copy_file<D: FileDirectory>(dir: &D, src: &str, dst: &str) -> Result<u64> {
    let mut input = dir.open_input(src)?;
    let mut output = dir.create_output(dst)?;
    let length = input.length();

    let mut buf = vec![0u8; COPY_BUFFER];
    let mut remaining = length;
    while remaining > 0 {
        let n = usize::try_from(remaining).map_or(COPY_BUFFER, |r| r.min(COPY_BUFFER));
        input.read_bytes(&mut buf[..n])?;
        output.write_bytes(&buf[..n])?;
        remaining -= n as u64;
    }
    output.close()?;
    input.close();
    Ok(length)
}
