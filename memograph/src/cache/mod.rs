//! Two-tier result caching.
//!
//! The [`MemoryCache`] is the first tier: a content-addressed in-process
//! store with single-flight computation per fingerprint and LRU eviction
//! over released records. The second tier is a pluggable blob store behind
//! the [`SecondaryStorage`] trait, consulted through
//! [`resolve_secondary_cached`] for fully-cached requests only.

pub mod providers;

mod memory;
mod secondary;
mod storage;
mod types;

pub use memory::{CacheHandle, MemoryCache, RecordState};
pub use secondary::resolve_secondary_cached;
pub use storage::{SecondaryStorage, StorageError, StorageFactoryRegistry};
pub use types::{CacheEntrySnapshot, CacheSnapshot, MemoryCacheConfig, RecordStateKind};
