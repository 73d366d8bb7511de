//! In-memory secondary storage, for tests and single-process setups.

use crate::cache::storage::{SecondaryStorage, StorageError};
use crate::request::BoxFuture;
use crate::value::Blob;
use dashmap::DashMap;

/// HashMap-backed blob store.
#[derive(Default)]
pub struct MemoryStorage {
    entries: DashMap<String, Blob>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SecondaryStorage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn read<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Blob>, StorageError>> {
        Box::pin(async move { Ok(self.entries.get(key).map(|entry| entry.value().clone())) })
    }

    fn write<'a>(&'a self, key: &'a str, blob: Blob) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            self.entries.insert(key.to_string(), blob);
            Ok(())
        })
    }

    fn clear<'a>(&'a self) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            self.entries.clear();
            Ok(())
        })
    }
}
