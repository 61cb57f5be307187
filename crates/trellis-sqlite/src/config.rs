//! SQLite backend configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Connection and pragma settings for the relational backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file path; ":memory:" for an in-memory database
    pub path: PathBuf,
    /// WAL mode for better read concurrency
    pub wal_mode: bool,
    /// Enforce foreign keys
    pub foreign_keys: bool,
    /// Busy timeout in milliseconds
    pub busy_timeout_ms: u32,
    /// Cache size in pages (negative means KiB)
    pub cache_size: i32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("trellis.db"),
            wal_mode: true,
            foreign_keys: true,
            busy_timeout_ms: 5_000,
            cache_size: -64_000,
        }
    }
}

impl SqliteConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// In-memory database for tests
    pub fn memory() -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            // WAL is meaningless in memory
            wal_mode: false,
            ..Default::default()
        }
    }
}
