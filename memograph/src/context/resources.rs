//! Shared per-process resources.

use crate::cache::{
    MemoryCache, MemoryCacheConfig, SecondaryStorage, StorageError, StorageFactoryRegistry,
};
use crate::config::{keys, Config, ConfigError};
use crate::value::Blob;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::info;

/// Errors from resource construction.
#[derive(Debug, Error, Clone)]
pub enum ResourceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// The resource set every context shares: memory cache, optional secondary
/// storage, the blob-file directory for cross-process sharing, and test
/// hooks.
pub struct Resources {
    config: Config,
    memory_cache: MemoryCache,
    secondary: Option<Arc<dyn SecondaryStorage>>,
    blob_dir: PathBuf,
    testing: bool,
    mock_http: Mutex<HashMap<String, Blob>>,
}

impl Resources {
    /// Builds resources from configuration.
    ///
    /// The memory cache is sized from `memory_cache/unused_size_limit`;
    /// secondary storage is constructed iff `disk_cache/factory` names a
    /// registered plugin.
    pub fn new(config: Config) -> Result<Arc<Self>, ResourceError> {
        let secondary = match config.get_string(keys::DISK_CACHE_FACTORY) {
            Some(factory) => {
                let storage = StorageFactoryRegistry::global().construct(&factory, &config)?;
                info!(%factory, "secondary storage constructed");
                Some(storage)
            }
            None => None,
        };
        Self::build(config, secondary)
    }

    /// Builds resources with an explicit secondary storage, bypassing the
    /// factory registry.
    pub fn with_storage(
        config: Config,
        storage: Arc<dyn SecondaryStorage>,
    ) -> Result<Arc<Self>, ResourceError> {
        Self::build(config, Some(storage))
    }

    fn build(
        config: Config,
        secondary: Option<Arc<dyn SecondaryStorage>>,
    ) -> Result<Arc<Self>, ResourceError> {
        let mut cache_config = MemoryCacheConfig::default();
        if let Some(limit) = config.get_integer(keys::MEMORY_CACHE_UNUSED_SIZE_LIMIT)? {
            cache_config.unused_size_limit = limit as usize;
        }
        let testing = config.get_bool(keys::TESTING)?.unwrap_or(false);
        let blob_dir = std::env::temp_dir().join("memograph-blobs");

        Ok(Arc::new(Self {
            config,
            memory_cache: MemoryCache::new(cache_config),
            secondary,
            blob_dir,
            testing,
            mock_http: Mutex::new(HashMap::new()),
        }))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn memory_cache(&self) -> &MemoryCache {
        &self.memory_cache
    }

    pub fn secondary_storage(&self) -> Option<Arc<dyn SecondaryStorage>> {
        self.secondary.clone()
    }

    /// Directory for memory-mapped blob files shared with remote peers.
    pub fn blob_dir(&self) -> &PathBuf {
        &self.blob_dir
    }

    /// Whether test hooks are enabled (`testing` config key).
    pub fn is_testing(&self) -> bool {
        self.testing
    }

    /// Installs a canned response for `url`. Test hook.
    pub fn set_mock_http(&self, url: impl Into<String>, body: Blob) {
        self.mock_http.lock().unwrap().insert(url.into(), body);
    }

    /// Looks up a canned response for `url`. Test hook.
    pub fn mock_http(&self, url: &str) -> Option<Blob> {
        self.mock_http.lock().unwrap().get(url).cloned()
    }
}
