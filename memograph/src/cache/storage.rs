//! The pluggable secondary-storage interface.

use crate::config::Config;
use crate::request::BoxFuture;
use crate::value::Blob;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use thiserror::Error;

/// Errors from a secondary-storage backend.
///
/// These never fail a resolution: reads that error are treated as misses
/// and writes are best-effort.
#[derive(Debug, Error, Clone)]
pub enum StorageError {
    #[error("storage i/o: {0}")]
    Io(String),

    #[error("storage backend: {0}")]
    Backend(String),

    #[error("no storage plugin registered under '{0}'")]
    UnknownFactory(String),

    #[error("invalid storage configuration: {0}")]
    InvalidConfig(String),
}

impl From<std::io::Error> for StorageError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

/// A key → blob store used as the second cache tier.
///
/// Keys are request digest hex strings. `read` returning `None` means the
/// key is absent; `write` may complete lazily on the backend side.
pub trait SecondaryStorage: Send + Sync {
    /// The plugin name this store was constructed under.
    fn name(&self) -> &str;

    /// Reads the blob stored under `key`, or `None` on a miss.
    fn read<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Blob>, StorageError>>;

    /// Stores `blob` under `key`.
    fn write<'a>(&'a self, key: &'a str, blob: Blob) -> BoxFuture<'a, Result<(), StorageError>>;

    /// Removes everything from the store.
    fn clear<'a>(&'a self) -> BoxFuture<'a, Result<(), StorageError>>;
}

impl std::fmt::Debug for dyn SecondaryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecondaryStorage({})", self.name())
    }
}

type StorageFactory =
    Arc<dyn Fn(&Config) -> Result<Arc<dyn SecondaryStorage>, StorageError> + Send + Sync>;

/// Registry of secondary-storage plugins by name.
///
/// The `disk_cache/factory` config key selects which plugin a resource set
/// constructs. The bundled `disk` and `memory` plugins are pre-registered
/// in the global registry.
#[derive(Clone)]
pub struct StorageFactoryRegistry {
    factories: Arc<Mutex<HashMap<String, StorageFactory>>>,
}

static GLOBAL_FACTORIES: OnceLock<StorageFactoryRegistry> = OnceLock::new();

impl StorageFactoryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            factories: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The process-wide registry, with the bundled plugins registered.
    pub fn global() -> &'static StorageFactoryRegistry {
        GLOBAL_FACTORIES.get_or_init(|| {
            let registry = StorageFactoryRegistry::new();
            registry.register("memory", |_config| {
                Ok(Arc::new(crate::cache::providers::MemoryStorage::new())
                    as Arc<dyn SecondaryStorage>)
            });
            registry.register("disk", |config| {
                let directory = crate::cache::providers::DiskStorage::directory_from(config);
                Ok(Arc::new(crate::cache::providers::DiskStorage::new(directory))
                    as Arc<dyn SecondaryStorage>)
            });
            registry
        })
    }

    /// Registers a plugin factory under `name`, replacing any previous one.
    pub fn register<F>(&self, name: &str, factory: F)
    where
        F: Fn(&Config) -> Result<Arc<dyn SecondaryStorage>, StorageError> + Send + Sync + 'static,
    {
        self.factories
            .lock()
            .unwrap()
            .insert(name.to_string(), Arc::new(factory));
    }

    /// Constructs the plugin registered under `name`.
    pub fn construct(
        &self,
        name: &str,
        config: &Config,
    ) -> Result<Arc<dyn SecondaryStorage>, StorageError> {
        let factory = self
            .factories
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::UnknownFactory(name.to_string()))?;
        factory(config)
    }

    /// Registered plugin names, unordered.
    pub fn names(&self) -> Vec<String> {
        self.factories.lock().unwrap().keys().cloned().collect()
    }
}

impl Default for StorageFactoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}
