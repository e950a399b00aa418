//! Redb table definitions for persistent directory storage.

use redb::TableDefinition;

// Key: "dir\x00file", Value: JSON-encoded FileMetadata
pub const FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("files");
// Key: "dir\x00file\x00{index:016x}", Value: raw chunk payload
pub const CHUNKS: TableDefinition<&str, &[u8]> = TableDefinition::new("chunks");
// Key: "dir\x00lock", Value: JSON-encoded LockRecord
pub const LOCKS: TableDefinition<&str, &[u8]> = TableDefinition::new("locks");
