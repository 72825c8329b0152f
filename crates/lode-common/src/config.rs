//! Configuration structures for LodeDB.

use crate::page::PAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration for the database engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the database file.
    pub db_file: PathBuf,
    /// Buffer pool size in number of frames.
    pub buffer_pool_pages: usize,
    /// Flush file writes through to disk.
    pub fsync_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_file: PathBuf::from("./data/lode.db"),
            buffer_pool_pages: 1024,
            fsync_enabled: true,
        }
    }
}

impl StorageConfig {
    /// Returns the total buffer pool size in bytes.
    pub fn buffer_pool_size_bytes(&self) -> usize {
        self.buffer_pool_pages * PAGE_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.db_file, PathBuf::from("./data/lode.db"));
        assert_eq!(config.buffer_pool_pages, 1024);
        assert!(config.fsync_enabled);
    }

    #[test]
    fn test_buffer_pool_size_bytes() {
        let config = StorageConfig {
            buffer_pool_pages: 256,
            ..Default::default()
        };
        assert_eq!(config.buffer_pool_size_bytes(), 256 * PAGE_SIZE);
    }

    #[test]
    fn test_serde_roundtrip() {
        let original = StorageConfig::default();
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: StorageConfig = serde_json::from_str(&serialized).unwrap();

        assert_eq!(original.db_file, deserialized.db_file);
        assert_eq!(original.buffer_pool_pages, deserialized.buffer_pool_pages);
        assert_eq!(original.fsync_enabled, deserialized.fsync_enabled);
    }
}
