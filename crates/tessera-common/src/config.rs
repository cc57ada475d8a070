//! Configuration structures for TesseraDB.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a TesseraDB engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the data file (fixed-size blocks, block 0 is meta).
    pub data_path: PathBuf,
    /// Path to the write-ahead log file.
    pub wal_path: PathBuf,
    /// Enable fsync for durability.
    pub fsync_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("./tessera.db"),
            wal_path: PathBuf::from("./tessera.wal"),
            fsync_enabled: true,
        }
    }
}

impl EngineConfig {
    /// Creates a config for the given data and WAL paths.
    pub fn new(data_path: impl Into<PathBuf>, wal_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            wal_path: wal_path.into(),
            fsync_enabled: true,
        }
    }
}
