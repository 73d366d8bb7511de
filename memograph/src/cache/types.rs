//! Cache configuration and inspection types.

/// Memory cache configuration.
#[derive(Debug, Clone)]
pub struct MemoryCacheConfig {
    /// Maximum total bytes of records that are no longer in use.
    /// Records pinned by a handle never count against this limit.
    pub unused_size_limit: usize,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            unused_size_limit: 1024 * 1024 * 1024, // 1 GiB
        }
    }
}

/// State tag of a cache record, without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStateKind {
    Loading,
    Ready,
    Failed,
}

/// Inspection view of one cache record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntrySnapshot {
    /// The record key's 64-bit hash, for display.
    pub key_hash: u64,
    pub state: RecordStateKind,
    /// Size of the cached value; 0 unless `Ready`.
    pub size: usize,
    pub refcount: usize,
}

/// Inspection view of the whole memory cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSnapshot {
    /// Records currently pinned by at least one handle.
    pub in_use: Vec<CacheEntrySnapshot>,
    /// Released records, in eviction order (least recently released first).
    pub pending_eviction: Vec<CacheEntrySnapshot>,
    /// Total bytes on the eviction list; `Loading` records count zero.
    pub total_evictable_size: usize,
}
