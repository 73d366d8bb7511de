//! Recognized configuration keys.

/// Maximum bytes of released records in the memory cache.
pub const MEMORY_CACHE_UNUSED_SIZE_LIMIT: &str = "memory_cache/unused_size_limit";

/// Name of the secondary-storage plugin to construct, if any.
pub const DISK_CACHE_FACTORY: &str = "disk_cache/factory";

/// Directory used by the `disk` storage plugin.
pub const DISK_CACHE_DIRECTORY: &str = "disk_cache/directory";

/// Server-side concurrent resolution limit.
pub const RPCLIB_REQUEST_CONCURRENCY: &str = "rpclib/request_concurrency";

/// Result size above which a server returns a shared-file reference.
pub const RPCLIB_SHARED_BLOB_THRESHOLD: &str = "rpclib/shared_blob_threshold";

/// Enables test hooks (mock HTTP table, forced failures and delays).
pub const TESTING: &str = "testing";
