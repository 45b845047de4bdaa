//! Application and storage configuration.

use crate::catalog::DEFAULT_ID_COLUMN;
use crate::error::{Error, Result};
use crate::module::ModuleManifest;
use crate::storage::{MemoryStorage, SledStorage, Storage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default sled directory.
pub const DEFAULT_DATA_PATH: &str = "./zesk_data";

/// Default sled page cache capacity (64 MB).
pub const DEFAULT_CACHE_CAPACITY: u64 = 64 * 1024 * 1024;

/// Default sled flush interval in milliseconds.
pub const DEFAULT_FLUSH_EVERY_MS: u64 = 1000;

/// Which storage implementation backs model instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process memory; contents are lost on exit.
    #[default]
    Memory,
    /// A sled database directory.
    Sled,
}

/// Configuration for the storage layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage implementation.
    pub backend: StorageBackend,

    /// Path to the database directory (sled only).
    pub path: PathBuf,

    /// Temporary database, deleted on drop (sled only).
    pub temporary: bool,

    /// Page cache capacity in bytes (sled only).
    pub cache_capacity: u64,

    /// Flush interval in milliseconds. None means sled's default.
    pub flush_every_ms: Option<u64>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: PathBuf::from(DEFAULT_DATA_PATH),
            temporary: false,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            flush_every_ms: Some(DEFAULT_FLUSH_EVERY_MS),
        }
    }
}

impl StorageConfig {
    /// In-memory storage.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Sled storage at `path`.
    pub fn sled(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: StorageBackend::Sled,
            path: path.into(),
            ..Default::default()
        }
    }

    /// Temporary sled storage for testing.
    pub fn temporary() -> Self {
        Self {
            backend: StorageBackend::Sled,
            path: PathBuf::new(),
            temporary: true,
            ..Default::default()
        }
    }

    /// Set the cache capacity.
    pub fn with_cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = bytes;
        self
    }

    /// Set the flush interval.
    pub fn with_flush_every_ms(mut self, ms: Option<u64>) -> Self {
        self.flush_every_ms = ms;
        self
    }

    /// Convert to sled configuration.
    pub(crate) fn to_sled_config(&self) -> sled::Config {
        let mut config = sled::Config::new()
            .cache_capacity(self.cache_capacity)
            .flush_every_ms(self.flush_every_ms);

        if self.temporary {
            config = config.temporary(true);
        } else {
            config = config.path(&self.path);
        }

        config
    }

    /// Open the configured storage.
    pub fn open(&self) -> Result<Box<dyn Storage>> {
        match self.backend {
            StorageBackend::Memory => Ok(Box::new(MemoryStorage::new())),
            StorageBackend::Sled => Ok(Box::new(SledStorage::open(self)?)),
        }
    }
}

/// Application-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Prefix applied to implied table names.
    pub table_prefix: String,

    /// Id column implied for classes that declare no keys.
    pub id_column_default: String,

    /// Hooks whose first callback failure aborts the call.
    pub fail_fast_hooks: Vec<String>,

    /// Storage settings.
    pub storage: StorageConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            table_prefix: String::new(),
            id_column_default: DEFAULT_ID_COLUMN.to_string(),
            fail_fast_hooks: Vec::new(),
            storage: StorageConfig::default(),
        }
    }
}

impl AppConfig {
    /// Create a default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the table prefix.
    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Set the default id column.
    pub fn with_id_column_default(mut self, column: impl Into<String>) -> Self {
        self.id_column_default = column.into();
        self
    }

    /// Declare a hook fail-fast.
    pub fn with_fail_fast_hook(mut self, hook: impl Into<String>) -> Self {
        self.fail_fast_hooks.push(hook.into());
        self
    }

    /// Set the storage configuration.
    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }
}

/// Everything needed to boot an application: settings plus module manifests.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Bootstrap {
    /// Application settings.
    pub config: AppConfig,

    /// Modules to register, in order.
    pub modules: Vec<ModuleManifest>,
}

impl Bootstrap {
    /// Parse a bootstrap document.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a bootstrap file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }
}
