//! Store configuration.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use wellstore_storage::{InMemoryBackend, StorageBackend, StorageResult};

/// Environment variable naming the store directory.
pub const ENV_PATH: &str = "WELLSTORE_PATH";
/// Environment variable toggling sync-on-commit (`0`/`false` disables).
pub const ENV_SYNC: &str = "WELLSTORE_SYNC";
/// Directory used when `WELLSTORE_PATH` is unset.
pub const DEFAULT_DIR: &str = "wellstore-data";

/// Builds a fresh log backend each time the store is opened.
pub type BackendFactory = Arc<dyn Fn() -> StorageResult<Box<dyn StorageBackend>> + Send + Sync>;

/// Where the store log lives.
#[derive(Clone)]
pub enum StoreLocation {
    /// A directory holding `LOCK` and `store.log`.
    Directory(PathBuf),
    /// A shared in-memory buffer. Reopening with a clone of the same
    /// buffer sees previously committed data.
    Memory(InMemoryBackend),
    /// Caller-supplied backend, used by fault-injection tests.
    Custom(BackendFactory),
}

impl fmt::Debug for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory(path) => f.debug_tuple("Directory").field(path).finish(),
            Self::Memory(_) => f.write_str("Memory"),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Where the log is kept.
    pub location: StoreLocation,

    /// Whether to create the directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to sync the log on every commit (safer but slower).
    pub sync_on_commit: bool,

    /// Frame count above which the log is compacted on open (0 = never).
    pub compact_threshold: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            location: StoreLocation::Memory(InMemoryBackend::new()),
            create_if_missing: true,
            sync_on_commit: true,
            compact_threshold: 0,
        }
    }
}

impl StoreConfig {
    /// Creates an in-memory configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for a store directory.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            location: StoreLocation::Directory(path.into()),
            ..Self::default()
        }
    }

    /// Configuration over a shared in-memory buffer.
    #[must_use]
    pub fn in_memory(buffer: InMemoryBackend) -> Self {
        Self {
            location: StoreLocation::Memory(buffer),
            ..Self::default()
        }
    }

    /// Configuration over a custom backend factory.
    pub fn with_backend<F>(factory: F) -> Self
    where
        F: Fn() -> StorageResult<Box<dyn StorageBackend>> + Send + Sync + 'static,
    {
        Self {
            location: StoreLocation::Custom(Arc::new(factory)),
            ..Self::default()
        }
    }

    /// Reads `WELLSTORE_PATH` and `WELLSTORE_SYNC`.
    #[must_use]
    pub fn from_env() -> Self {
        let path = std::env::var_os(ENV_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DIR));
        let sync = std::env::var(ENV_SYNC)
            .map(|v| parse_flag(&v))
            .unwrap_or(true);
        Self::at(path).sync_on_commit(sync)
    }

    /// Sets whether to create the directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync the log on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the auto-compaction threshold.
    #[must_use]
    pub const fn compact_threshold(mut self, frames: u64) -> Self {
        self.compact_threshold = frames;
        self
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = StoreConfig::default();
        assert!(config.create_if_missing);
        assert!(config.sync_on_commit);
        assert_eq!(config.compact_threshold, 0);
        assert!(matches!(config.location, StoreLocation::Memory(_)));
    }

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::at("/tmp/wellness")
            .create_if_missing(false)
            .sync_on_commit(false)
            .compact_threshold(64);

        assert!(!config.create_if_missing);
        assert!(!config.sync_on_commit);
        assert_eq!(config.compact_threshold, 64);
        assert_eq!(format!("{:?}", config.location), "Directory(\"/tmp/wellness\")");
    }

    #[test]
    fn sync_flag_parsing() {
        assert!(!parse_flag("0"));
        assert!(!parse_flag("False"));
        assert!(!parse_flag(" off "));
        assert!(parse_flag("1"));
        assert!(parse_flag("yes"));
    }
}
