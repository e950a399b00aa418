//! chunkdir VFS - chunked file directory over a key-value store
//!
//! Exposes a store namespace as a directory of named files. Each file is a
//! metadata record plus a sequence of fixed-size chunks:
//!
//! ```text
//! Directory "index" (chunk size 64)
//! ├── index/World.txt         → FileMetadata { size: 106, .. }
//! ├── index/World.txt#0       → bytes 0 - 64
//! ├── index/World.txt#1       → bytes 64 - 106
//! └── index/write.lock.lock   → LockRecord
//! ```
//!
//! # Example
//!
//! ```
//! use chunkdir_store::{KeyValueStore, MemoryStore};
//! use chunkdir_vfs::Directory;
//! use std::sync::Arc;
//!
//! let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
//! let dir = Directory::with_chunk_size(store, "index", 64)?;
//!
//! let mut out = dir.create_output("Hello.txt")?;
//! out.write_bytes(b"Hello world.")?;
//! out.close()?;
//!
//! let mut input = dir.open_input("Hello.txt")?;
//! let mut buf = vec![0u8; input.length() as usize];
//! input.read_bytes(&mut buf)?;
//! assert_eq!(buf, b"Hello world.");
//! # Ok::<(), chunkdir_common::Error>(())
//! ```

pub mod chunk;
pub mod contract;
pub mod directory;
pub mod lock;
pub mod reader;
pub mod writer;

pub use chunk::{ChunkId, ChunkMapper, ChunkRange};
pub use contract::{FileDirectory, FileInput, FileOutput, copy_file};
pub use directory::Directory;
pub use lock::DirectoryLock;
pub use reader::ChunkReader;
pub use writer::ChunkWriter;
