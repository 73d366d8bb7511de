//! Content-addressed in-memory cache with single-flight computation.
//!
//! Records are keyed by request [`Fingerprint`]; the first caller for a key
//! spawns the factory on a shared task and every concurrent caller attaches
//! to the same record. External holders pin records through [`CacheHandle`];
//! a record joins the eviction list only when its last handle is dropped,
//! and `unused_size_limit` bounds the total bytes of such released records.

use crate::cache::types::{
    CacheEntrySnapshot, CacheSnapshot, MemoryCacheConfig, RecordStateKind,
};
use crate::identity::Fingerprint;
use crate::request::BoxFuture;
use crate::resolve::ResolveError;
use crate::value::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::debug;

/// State of a cache record.
///
/// Transitions are `Loading → Ready` or `Loading → Failed`; a terminal
/// state is never mutated. A later retry for the same fingerprint creates a
/// fresh record — there is no negative caching.
#[derive(Debug, Clone)]
pub enum RecordState {
    Loading,
    Ready(Value),
    Failed(ResolveError),
}

impl RecordState {
    fn kind(&self) -> RecordStateKind {
        match self {
            Self::Loading => RecordStateKind::Loading,
            Self::Ready(_) => RecordStateKind::Ready,
            Self::Failed(_) => RecordStateKind::Failed,
        }
    }
}

struct Record {
    key: Fingerprint,
    state: watch::Sender<RecordState>,
    /// Pin count; mutated only under the cache mutex.
    refcount: AtomicUsize,
    /// Bumped whenever the record is re-pinned or re-enqueued, invalidating
    /// older eviction-list entries.
    epoch: AtomicU64,
    /// Value size; 0 until `Ready`.
    size: AtomicUsize,
}

struct CacheState {
    records: HashMap<Fingerprint, Arc<Record>>,
    /// (key, epoch-at-enqueue); stale entries are skipped during sweeps.
    eviction: VecDeque<(Fingerprint, u64)>,
    /// Total bytes of `Ready` records with refcount 0.
    unused_size: usize,
}

struct CacheInner {
    config: MemoryCacheConfig,
    state: Mutex<CacheState>,
}

/// The in-process content-addressed cache.
///
/// Cloning shares the underlying store.
#[derive(Clone)]
pub struct MemoryCache {
    inner: Arc<CacheInner>,
}

impl MemoryCache {
    pub fn new(config: MemoryCacheConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                config,
                state: Mutex::new(CacheState {
                    records: HashMap::new(),
                    eviction: VecDeque::new(),
                    unused_size: 0,
                }),
            }),
        }
    }

    /// Returns a pinned handle for `key`, creating the record and spawning
    /// `factory` on a shared task if no record exists.
    ///
    /// At most one factory per fingerprint ever runs concurrently: every
    /// caller that arrives while a record exists attaches to it. On lookup,
    /// fingerprint equality performs a full structural comparison, so hash
    /// collisions resolve to distinct records.
    pub fn get_or_create<F>(&self, key: &Fingerprint, factory: F) -> CacheHandle
    where
        F: FnOnce() -> BoxFuture<'static, Result<Value, ResolveError>>,
    {
        let record = {
            let mut state = self.inner.state.lock().unwrap();
            if let Some(existing) = state.records.get(key).cloned() {
                if matches!(&*existing.state.borrow(), RecordState::Failed(_)) {
                    // No negative caching: every waiter attached before the
                    // failure observes it, but a later lookup starts fresh.
                    // Holders of the orphaned record keep working through
                    // their own handles.
                    state.records.remove(key);
                } else {
                    Self::pin(&mut state, &existing);
                    return CacheHandle {
                        record: existing,
                        inner: Arc::clone(&self.inner),
                    };
                }
            }
            let (tx, _rx) = watch::channel(RecordState::Loading);
            let record = Arc::new(Record {
                key: key.clone(),
                state: tx,
                refcount: AtomicUsize::new(1),
                epoch: AtomicU64::new(0),
                size: AtomicUsize::new(0),
            });
            state.records.insert(key.clone(), Arc::clone(&record));
            record
        };

        let future = factory();
        let inner = Arc::clone(&self.inner);
        let task_record = Arc::clone(&record);
        tokio::spawn(async move {
            let result = future.await;
            CacheInner::complete(&inner, &task_record, result);
        });

        CacheHandle {
            record,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Pins an existing record without creating one.
    ///
    /// This is how callers keep a resolved result in memory beyond the
    /// resolution call: the returned handle locks the record against
    /// eviction until dropped.
    pub fn get(&self, key: &Fingerprint) -> Option<CacheHandle> {
        let mut state = self.inner.state.lock().unwrap();
        let record = state.records.get(key).cloned()?;
        Self::pin(&mut state, &record);
        Some(CacheHandle {
            record,
            inner: Arc::clone(&self.inner),
        })
    }

    /// Whether a record exists for `key`, in any state.
    pub fn contains(&self, key: &Fingerprint) -> bool {
        self.inner.state.lock().unwrap().records.contains_key(key)
    }

    /// Number of records, in any state.
    pub fn entry_count(&self) -> usize {
        self.inner.state.lock().unwrap().records.len()
    }

    /// Total bytes of released (`refcount == 0`) records.
    pub fn unused_size(&self) -> usize {
        self.inner.state.lock().unwrap().unused_size
    }

    /// Drops every record with refcount zero.
    pub fn clear_unused(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state
            .records
            .retain(|_, record| record.refcount.load(Ordering::Relaxed) > 0);
        state.eviction.clear();
        state.unused_size = 0;
    }

    /// Inspection view: pinned records, eviction queue, evictable bytes.
    pub fn snapshot(&self) -> CacheSnapshot {
        let state = self.inner.state.lock().unwrap();
        let mut snapshot = CacheSnapshot {
            total_evictable_size: state.unused_size,
            ..Default::default()
        };
        for record in state.records.values() {
            if record.refcount.load(Ordering::Relaxed) > 0 {
                snapshot.in_use.push(Self::entry_snapshot(record));
            }
        }
        for (key, epoch) in &state.eviction {
            if let Some(record) = state.records.get(key) {
                let live = record.epoch.load(Ordering::Relaxed) == *epoch
                    && record.refcount.load(Ordering::Relaxed) == 0;
                if live {
                    snapshot.pending_eviction.push(Self::entry_snapshot(record));
                }
            }
        }
        snapshot
    }

    fn entry_snapshot(record: &Record) -> CacheEntrySnapshot {
        let state_kind = record.state.borrow().kind();
        CacheEntrySnapshot {
            key_hash: record.key.hash64(),
            state: state_kind,
            size: record.size.load(Ordering::Relaxed),
            refcount: record.refcount.load(Ordering::Relaxed),
        }
    }

    /// Pins an existing record: refcount +1, leaving the eviction list if
    /// this was the first pin.
    fn pin(state: &mut CacheState, record: &Arc<Record>) {
        let previous = record.refcount.fetch_add(1, Ordering::Relaxed);
        if previous == 0 {
            // Invalidate any eviction-list entry and stop counting the size
            // as unused.
            record.epoch.fetch_add(1, Ordering::Relaxed);
            state.unused_size = state
                .unused_size
                .saturating_sub(record.size.load(Ordering::Relaxed));
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(MemoryCacheConfig::default())
    }
}

impl CacheInner {
    /// Terminal transition for a record, called once by its factory task.
    fn complete(inner: &Arc<CacheInner>, record: &Arc<Record>, result: Result<Value, ResolveError>) {
        let mut state = inner.state.lock().unwrap();
        let size = match &result {
            Ok(value) => value.size_estimate(),
            Err(_) => 0,
        };
        record.size.store(size, Ordering::Relaxed);
        record.state.send_replace(match result {
            Ok(value) => RecordState::Ready(value),
            Err(error) => RecordState::Failed(error),
        });

        // If the record was released while loading it sits on the eviction
        // list counting zero bytes; account for its real size now.
        let still_present = state
            .records
            .get(&record.key)
            .is_some_and(|current| Arc::ptr_eq(current, record));
        if still_present && record.refcount.load(Ordering::Relaxed) == 0 {
            let epoch = record.epoch.fetch_add(1, Ordering::Relaxed) + 1;
            state.eviction.push_back((record.key.clone(), epoch));
            state.unused_size += size;
            Self::evict_over_limit(&mut state, &inner.config);
        }
    }

    /// Releases one pin; at zero the record joins the eviction list tail.
    fn release(inner: &Arc<CacheInner>, record: &Arc<Record>) {
        let mut state = inner.state.lock().unwrap();
        let previous = record.refcount.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(previous > 0, "cache refcount underflow");
        if previous == 1 {
            let epoch = record.epoch.fetch_add(1, Ordering::Relaxed) + 1;
            state.eviction.push_back((record.key.clone(), epoch));
            state.unused_size += record.size.load(Ordering::Relaxed);
            Self::evict_over_limit(&mut state, &inner.config);
        }
    }

    /// Evicts released records, least recently released first, until the
    /// unused total is back under the limit.
    fn evict_over_limit(state: &mut CacheState, config: &MemoryCacheConfig) {
        while state.unused_size > config.unused_size_limit {
            let Some((key, epoch)) = state.eviction.pop_front() else {
                break;
            };
            let Some(record) = state.records.get(&key).cloned() else {
                continue; // already evicted or cleared
            };
            if record.epoch.load(Ordering::Relaxed) != epoch
                || record.refcount.load(Ordering::Relaxed) > 0
            {
                continue; // stale entry; the record was re-pinned
            }
            if matches!(&*record.state.borrow(), RecordState::Loading) {
                // Evicting a loading record would break single-flight; its
                // completion re-enqueues it with the real size.
                continue;
            }
            let size = record.size.load(Ordering::Relaxed);
            state.records.remove(&key);
            state.unused_size = state.unused_size.saturating_sub(size);
            debug!(key = record.key.hash64(), size, "evicted cache record");
        }
    }
}

/// Pinned, shared reference to a cache record.
///
/// While any handle exists the record cannot be evicted. Dropping the last
/// handle sends the record to the eviction list.
pub struct CacheHandle {
    record: Arc<Record>,
    inner: Arc<CacheInner>,
}

impl CacheHandle {
    /// Waits for the record to leave `Loading`, then returns the value or
    /// re-raises the stored failure.
    ///
    /// This never takes the cache mutex.
    pub async fn value(&self) -> Result<Value, ResolveError> {
        let mut rx = self.record.state.subscribe();
        let outcome = rx
            .wait_for(|state| !matches!(state, RecordState::Loading))
            .await;
        match outcome {
            Ok(state) => match &*state {
                RecordState::Ready(value) => Ok(value.clone()),
                RecordState::Failed(error) => Err(error.clone()),
                RecordState::Loading => unreachable!("wait_for skips Loading"),
            },
            // The sender lives in the record we hold, so this cannot happen
            // while the handle is alive.
            Err(_) => Err(ResolveError::Computation(
                "cache record abandoned".to_string(),
            )),
        }
    }

    /// Current state tag without waiting.
    pub fn state_kind(&self) -> RecordStateKind {
        self.record.state.borrow().kind()
    }
}

impl Clone for CacheHandle {
    fn clone(&self) -> Self {
        // A live handle guarantees refcount >= 1, so this cannot race a
        // transition to zero.
        self.record.refcount.fetch_add(1, Ordering::Relaxed);
        Self {
            record: Arc::clone(&self.record),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for CacheHandle {
    fn drop(&mut self) {
        CacheInner::release(&self.inner, &self.record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn key_of(n: i64) -> Fingerprint {
        Fingerprint::of_value(Value::Integer(n))
    }

    fn ready_factory(value: Value) -> impl FnOnce() -> BoxFuture<'static, Result<Value, ResolveError>> {
        move || Box::pin(async move { Ok(value) })
    }

    fn sized_value(len: usize) -> Value {
        Value::Blob(crate::value::Blob::from_bytes(vec![0u8; len]))
    }

    #[tokio::test]
    async fn test_get_or_create_runs_factory_once() {
        let cache = MemoryCache::default();
        let calls = Arc::new(AtomicU32::new(0));
        let key = key_of(1);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let calls = Arc::clone(&calls);
            handles.push(cache.get_or_create(&key, move || {
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Integer(42))
                })
            }));
        }

        for handle in &handles {
            assert_eq!(handle.value().await.unwrap(), Value::Integer(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_reaches_every_waiter() {
        let cache = MemoryCache::default();
        let key = key_of(2);

        let first = cache.get_or_create(&key, || {
            Box::pin(async { Err(ResolveError::Computation("boom".into())) })
        });
        let second = cache.get_or_create(&key, || unreachable!("record exists"));

        for handle in [&first, &second] {
            match handle.value().await {
                Err(ResolveError::Computation(msg)) => assert_eq!(msg, "boom"),
                other => panic!("unexpected: {:?}", other),
            }
        }
        assert_eq!(first.state_kind(), RecordStateKind::Failed);
    }

    #[tokio::test]
    async fn test_released_records_join_eviction_list() {
        let cache = MemoryCache::default();
        let key = key_of(3);

        let handle = cache.get_or_create(&key, ready_factory(Value::Integer(9)));
        handle.value().await.unwrap();

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.in_use.len(), 1);
        assert!(snapshot.pending_eviction.is_empty());

        drop(handle);
        let snapshot = cache.snapshot();
        assert!(snapshot.in_use.is_empty());
        assert_eq!(snapshot.pending_eviction.len(), 1);
        assert!(snapshot.total_evictable_size > 0);
    }

    #[tokio::test]
    async fn test_eviction_bound_keeps_most_recent() {
        let one = sized_value(64).size_estimate();
        let cache = MemoryCache::new(MemoryCacheConfig {
            unused_size_limit: 3 * one,
        });

        for n in 0..5 {
            let handle = cache.get_or_create(&key_of(n), ready_factory(sized_value(64)));
            handle.value().await.unwrap();
            drop(handle);
        }

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.pending_eviction.len(), 3);
        assert_eq!(snapshot.total_evictable_size, 3 * one);
        // The oldest two are gone; the latest three remain.
        assert!(!cache.contains(&key_of(0)));
        assert!(!cache.contains(&key_of(1)));
        assert!(cache.contains(&key_of(2)));
        assert!(cache.contains(&key_of(3)));
        assert!(cache.contains(&key_of(4)));
    }

    #[tokio::test]
    async fn test_pinned_records_are_never_evicted() {
        let one = sized_value(64).size_estimate();
        let cache = MemoryCache::new(MemoryCacheConfig {
            unused_size_limit: one, // room for a single released record
        });

        let pinned = cache.get_or_create(&key_of(0), ready_factory(sized_value(64)));
        pinned.value().await.unwrap();

        // Churn through more records than the limit allows.
        for n in 1..5 {
            let handle = cache.get_or_create(&key_of(n), ready_factory(sized_value(64)));
            handle.value().await.unwrap();
            drop(handle);
        }

        assert!(cache.contains(&key_of(0)));
        assert_eq!(pinned.state_kind(), RecordStateKind::Ready);
        drop(pinned);
    }

    #[tokio::test]
    async fn test_repin_from_eviction_list() {
        let cache = MemoryCache::default();
        let key = key_of(7);

        let handle = cache.get_or_create(&key, ready_factory(Value::Integer(1)));
        handle.value().await.unwrap();
        drop(handle);
        assert!(cache.unused_size() > 0);

        // Re-acquire: the record leaves the unused set without rebuilding.
        let again = cache.get_or_create(&key, || unreachable!("record exists"));
        assert_eq!(cache.unused_size(), 0);
        assert_eq!(again.value().await.unwrap(), Value::Integer(1));

        drop(again);
        assert!(cache.unused_size() > 0);
        assert_eq!(cache.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_clear_unused_drops_released_only() {
        let cache = MemoryCache::default();

        let kept = cache.get_or_create(&key_of(1), ready_factory(Value::Integer(1)));
        kept.value().await.unwrap();

        let released = cache.get_or_create(&key_of(2), ready_factory(Value::Integer(2)));
        released.value().await.unwrap();
        drop(released);

        cache.clear_unused();
        assert!(cache.contains(&key_of(1)));
        assert!(!cache.contains(&key_of(2)));
        assert_eq!(cache.unused_size(), 0);
        drop(kept);
    }

    #[tokio::test]
    async fn test_handle_clone_shares_pin() {
        let cache = MemoryCache::default();
        let key = key_of(5);

        let handle = cache.get_or_create(&key, ready_factory(Value::Integer(5)));
        handle.value().await.unwrap();
        let clone = handle.clone();

        drop(handle);
        // Still pinned by the clone.
        assert!(cache.snapshot().pending_eviction.is_empty());

        drop(clone);
        assert_eq!(cache.snapshot().pending_eviction.len(), 1);
    }

    #[tokio::test]
    async fn test_later_lookup_after_failure_starts_fresh() {
        let cache = MemoryCache::default();
        let key = key_of(21);

        let failed = cache.get_or_create(&key, || {
            Box::pin(async { Err(ResolveError::Computation("once".into())) })
        });
        assert!(failed.value().await.is_err());
        drop(failed);

        // No negative caching: the next lookup computes anew.
        let retried = cache.get_or_create(&key, ready_factory(Value::Integer(5)));
        assert_eq!(retried.value().await.unwrap(), Value::Integer(5));
    }

    #[tokio::test]
    async fn test_release_while_loading_counts_zero_bytes() {
        let cache = MemoryCache::default();
        let key = key_of(11);

        let handle = cache.get_or_create(&key, || {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(sized_value(64))
            })
        });
        drop(handle); // released before the factory finishes

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.pending_eviction.len(), 1);
        assert_eq!(snapshot.pending_eviction[0].state, RecordStateKind::Loading);
        assert_eq!(snapshot.total_evictable_size, 0);

        // Once the factory completes the real size is accounted.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.unused_size() > 0);
    }
}
