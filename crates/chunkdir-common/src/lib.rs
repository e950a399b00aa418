//! chunkdir Common - Shared types and utilities
//!
//! This crate provides the key types, stored value records, error
//! definitions, and configuration used across all chunkdir components.

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, DEFAULT_CHUNK_SIZE, DirectoryConfig, StoreBackend, StoreConfig};
pub use error::{Error, Result, StoreError, StoreResult};
pub use types::*;
