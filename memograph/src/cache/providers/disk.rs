//! Disk-backed secondary storage.
//!
//! One file per digest, sharded by the first two hex characters to keep
//! directory sizes reasonable. Writes go through a temp file and a rename
//! so readers never observe partial blobs.

use crate::cache::storage::{SecondaryStorage, StorageError};
use crate::config::{keys, Config};
use crate::request::BoxFuture;
use crate::value::Blob;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File-per-key blob store rooted at a cache directory.
pub struct DiskStorage {
    directory: PathBuf,
}

impl DiskStorage {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Resolves the cache directory from config, defaulting to the user
    /// cache directory.
    pub fn directory_from(config: &Config) -> PathBuf {
        config
            .get_string(keys::DISK_CACHE_DIRECTORY)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::cache_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("memograph")
            })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let shard = if key.len() >= 2 { &key[..2] } else { "00" };
        self.directory.join(shard).join(key)
    }
}

impl SecondaryStorage for DiskStorage {
    fn name(&self) -> &str {
        "disk"
    }

    fn read<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Blob>, StorageError>> {
        Box::pin(async move {
            let path = self.path_for(key);
            match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(Some(Blob::from_bytes(bytes))),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(error) => Err(StorageError::from(error)),
            }
        })
    }

    fn write<'a>(&'a self, key: &'a str, blob: Blob) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let path = self.path_for(key);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            let tmp = path.with_extension("tmp");
            tokio::fs::write(&tmp, blob.as_slice()).await?;
            tokio::fs::rename(&tmp, &path).await?;
            debug!(key, bytes = blob.len(), "wrote secondary-storage blob");
            Ok(())
        })
    }

    fn clear<'a>(&'a self) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            match tokio::fs::remove_dir_all(&self.directory).await {
                Ok(()) => Ok(()),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(error) => Err(StorageError::from(error)),
            }
        })
    }
}
