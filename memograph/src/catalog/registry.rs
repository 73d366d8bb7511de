//! The process-wide registration store.

use crate::request::ErasedRequest;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use thiserror::Error;
use tracing::warn;

/// Errors from catalog registration and lookup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// No live registration for the uuid.
    #[error("unregistered uuid '{0}'")]
    UnregisteredUuid(String),

    /// The same uuid was registered twice through one catalog.
    #[error("conflicting registration for uuid '{0}'")]
    ConflictingUuid(String),

    /// The request class cannot be registered (no serializable uuid).
    #[error("request class '{0}' is not registrable")]
    NotRegistrable(String),

    /// The registered constructor rejected its arguments.
    #[error("constructing '{uuid}' failed: {reason}")]
    Construction { uuid: String, reason: String },
}

/// Constructs a request of one class from deserialized arguments.
pub type RequestConstructor =
    Arc<dyn Fn(Vec<ErasedRequest>) -> Result<ErasedRequest, CatalogError> + Send + Sync>;

/// Identifies the catalog (module) that made a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CatalogId(u64);

static NEXT_CATALOG_ID: AtomicU64 = AtomicU64::new(1);

impl CatalogId {
    /// Allocates a process-unique catalog id.
    pub fn next() -> Self {
        Self(NEXT_CATALOG_ID.fetch_add(1, Ordering::Relaxed))
    }
}

struct Registration {
    cat_id: CatalogId,
    constructor: RequestConstructor,
}

/// Mutex-protected map from uuid to an ordered registration list.
///
/// Lookups copy the constructor handle out, so the lock is never held
/// across user code. New registrations are prepended; unregistration strips
/// by catalog id. Entries are never overwritten in place.
#[derive(Clone)]
pub struct SeriRegistry {
    entries: Arc<Mutex<HashMap<String, Vec<Registration>>>>,
}

static GLOBAL_REGISTRY: OnceLock<SeriRegistry> = OnceLock::new();

impl SeriRegistry {
    /// Creates an empty, standalone registry.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static SeriRegistry {
        GLOBAL_REGISTRY.get_or_init(SeriRegistry::new)
    }

    /// Prepends a registration for `uuid` tagged with `cat_id`.
    pub fn register(&self, cat_id: CatalogId, uuid: &str, constructor: RequestConstructor) {
        let mut entries = self.entries.lock().unwrap();
        let list = entries.entry(uuid.to_string()).or_default();
        if list.iter().any(|reg| reg.cat_id == cat_id) {
            // A leftover entry with this tag means a prior unregister did
            // not run; the stale constructor stays shadowed, never called.
            warn!(uuid, ?cat_id, "duplicate registration for catalog id");
        }
        list.insert(
            0,
            Registration {
                cat_id,
                constructor,
            },
        );
    }

    /// Removes every registration tagged with `cat_id`.
    pub fn unregister(&self, cat_id: CatalogId) {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|_, list| {
            list.retain(|reg| reg.cat_id != cat_id);
            !list.is_empty()
        });
    }

    /// Returns the most recently registered constructor for `uuid`.
    pub fn lookup(&self, uuid: &str) -> Result<RequestConstructor, CatalogError> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(uuid)
            .and_then(|list| list.first())
            .map(|reg| reg.constructor.clone())
            .ok_or_else(|| CatalogError::UnregisteredUuid(uuid.to_string()))
    }

    /// Whether any live registration exists for `uuid`.
    pub fn contains(&self, uuid: &str) -> bool {
        self.entries.lock().unwrap().contains_key(uuid)
    }

    /// All registered uuids, unordered.
    pub fn uuids(&self) -> Vec<String> {
        self.entries.lock().unwrap().keys().cloned().collect()
    }

    /// Drops every registration. Test fixtures only.
    pub fn reset_for_test(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl Default for SeriRegistry {
    fn default() -> Self {
        Self::new()
    }
}
