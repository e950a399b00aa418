//! Configuration types for chunkdir
//!
//! This module defines the directory and store configuration, loadable from
//! a TOML file with every field defaulted.

use crate::error::{Error, Result};
use crate::types::validate_directory_name;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default chunk size: 16 KB
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Root configuration for chunkdir
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Directory configuration
    #[serde(default)]
    pub directory: DirectoryConfig,
    /// Store configuration
    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| Error::Configuration(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Check the configuration for values no directory can run with
    pub fn validate(&self) -> Result<()> {
        self.directory.validate()?;
        self.store.validate()
    }
}

/// Directory configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Directory name; scopes every key the directory writes
    #[serde(default = "default_directory_name")]
    pub name: String,
    /// Chunk size in bytes (default: 16 KB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            name: default_directory_name(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl DirectoryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Configuration("chunk_size must be positive".into()));
        }
        validate_directory_name(&self.name).map_err(|e| Error::Configuration(e.to_string()))
    }
}

fn default_directory_name() -> String {
    "index".to_string()
}

const fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

/// Which store adapter to open
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local hash map
    #[default]
    Memory,
    /// Persistent redb database file
    Redb,
}

/// Store configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Adapter to use
    #[serde(default)]
    pub backend: StoreBackend,
    /// Database path (required for redb)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.backend == StoreBackend::Redb && self.path.is_none() {
            return Err(Error::Configuration(
                "store.path is required for the redb backend".into(),
            ));
        }
        Ok(())
    }
}
