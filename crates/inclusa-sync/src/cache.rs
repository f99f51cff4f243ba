//! Fingerprint-keyed query cache.
//!
//! Each entry holds the last good value for a request together with its
//! status, last error and freshness. Concurrent reads of the same stale entry
//! share one in-flight fetch; a failed refetch keeps the previous value.
//!
//! Every in-flight fetch carries an id. A completion is applied only while its
//! id is still the entry's current fetch, so fetches superseded by a write,
//! cancelled, or orphaned by `remove`/`clear` never touch the cache.

use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use inclusa_api::ApiError;

use crate::config::SyncConfig;
use crate::fingerprint::Fingerprint;

/// Capacity of the cache event channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Shortest interval between background garbage collection passes.
const MIN_GC_INTERVAL: Duration = Duration::from_secs(1);

type Value = Arc<dyn Any + Send + Sync>;
type FetchFuture = Shared<BoxFuture<'static, Result<Value, ApiError>>>;

/// Lifecycle status of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Never fetched.
    Idle,
    /// A fetch is in flight.
    Loading,
    /// The last fetch or write succeeded.
    Success,
    /// The last fetch failed. A previous value may still be present.
    Error,
}

/// Snapshot of one cache entry.
#[derive(Debug)]
pub struct CacheEntry<T> {
    pub key: Fingerprint,
    /// Last successfully obtained value.
    pub value: Option<Arc<T>>,
    pub status: QueryStatus,
    /// Error of the most recent failed fetch.
    pub error: Option<ApiError>,
    /// When `value` was last replaced.
    pub last_updated: Option<DateTime<Utc>>,
    /// Whether the next read would refetch.
    pub is_stale: bool,
    pub is_fetching: bool,
}

impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: self.value.clone(),
            status: self.status,
            error: self.error.clone(),
            last_updated: self.last_updated,
            is_stale: self.is_stale,
            is_fetching: self.is_fetching,
        }
    }
}

impl<T> CacheEntry<T> {
    pub fn data(&self) -> Option<&T> {
        self.value.as_deref()
    }

    /// Loading with nothing to show yet.
    pub fn is_loading(&self) -> bool {
        self.value.is_none() && self.status == QueryStatus::Loading
    }

    /// The value if there is one (possibly stale), otherwise the error.
    pub fn into_result(self) -> Result<Arc<T>, ApiError> {
        self.into_query().map(|query| query.value)
    }

    /// Like [`into_result`](Self::into_result), but a stale value keeps the
    /// error of the refetch that failed to replace it.
    pub fn into_query(self) -> Result<Query<T>, ApiError> {
        match (self.value, self.error) {
            (Some(value), error) => Ok(Query { value, error }),
            (None, Some(error)) => Err(error),
            (None, None) => Err(ApiError::Cancelled),
        }
    }
}

/// A readable value and, when the last refetch failed, its error.
///
/// Dereferences to the value, so views render it either way and show the
/// error alongside.
#[derive(Debug)]
pub struct Query<T> {
    pub value: Arc<T>,
    pub error: Option<ApiError>,
}

impl<T> Query<T> {
    /// Whether the value is left over from before a failed refetch.
    pub fn is_outdated(&self) -> bool {
        self.error.is_some()
    }

    pub fn into_value(self) -> Arc<T> {
        self.value
    }
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            error: self.error.clone(),
        }
    }
}

impl<T> std::ops::Deref for Query<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Send + Sync + 'static> CacheEntry<T> {
    /// Entry for a fetch result that no longer has a slot in the cache.
    fn detached(key: &Fingerprint, result: Result<Value, ApiError>) -> Self {
        let (value, error, status) = match result {
            Ok(value) => (value.downcast::<T>().ok(), None, QueryStatus::Success),
            Err(error) => (None, Some(error), QueryStatus::Error),
        };
        Self {
            key: key.clone(),
            value,
            status,
            error,
            last_updated: None,
            is_stale: true,
            is_fetching: false,
        }
    }
}

/// Change notification for cache subscribers.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// An entry received a new value from a fetch or a write.
    Updated { key: Fingerprint },
    /// A fetch failed.
    Failed { key: Fingerprint, error: ApiError },
    /// Entries matching `filter` were marked stale.
    Invalidated { filter: Fingerprint, matched: usize },
    /// An entry was dropped.
    Removed { key: Fingerprint },
    /// Every entry was dropped.
    Cleared,
}

struct Inflight {
    id: u64,
    future: FetchFuture,
}

struct Slot {
    value: Option<Value>,
    error: Option<ApiError>,
    status: QueryStatus,
    last_updated: Option<DateTime<Utc>>,
    fetched_at: Option<Instant>,
    invalidated: bool,
    inflight: Option<Inflight>,
    observers: usize,
    touched_at: Instant,
}

impl Slot {
    fn new() -> Self {
        Self {
            value: None,
            error: None,
            status: QueryStatus::Idle,
            last_updated: None,
            fetched_at: None,
            invalidated: false,
            inflight: None,
            observers: 0,
            touched_at: Instant::now(),
        }
    }

    fn is_fresh<T: Any>(&self, stale_time: Duration) -> bool {
        let typed = self.value.as_ref().is_some_and(|v| (**v).is::<T>());
        typed
            && !self.invalidated
            && self.status == QueryStatus::Success
            && self
                .fetched_at
                .is_some_and(|at| at.elapsed() < stale_time)
    }

    fn store(&mut self, value: Value) {
        self.value = Some(value);
        self.error = None;
        self.status = QueryStatus::Success;
        self.last_updated = Some(Utc::now());
        self.fetched_at = Some(Instant::now());
        self.invalidated = false;
        self.touched_at = Instant::now();
    }

    /// Forget the in-flight fetch so its completion is ignored.
    fn detach(&mut self) -> Option<u64> {
        let inflight = self.inflight.take()?;
        self.status = match (&self.value, &self.error) {
            (_, Some(_)) => QueryStatus::Error,
            (Some(_), None) => QueryStatus::Success,
            (None, None) => QueryStatus::Idle,
        };
        Some(inflight.id)
    }

    fn snapshot<T: Send + Sync + 'static>(
        &self,
        key: &Fingerprint,
        stale_time: Duration,
    ) -> CacheEntry<T> {
        let value = self.value.clone().and_then(|v| match v.downcast::<T>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(key = %key, "cached value has unexpected type");
                None
            }
        });

        CacheEntry {
            key: key.clone(),
            value,
            status: self.status,
            error: self.error.clone(),
            last_updated: self.last_updated,
            is_stale: !self.is_fresh::<T>(stale_time),
            is_fetching: self.inflight.is_some(),
        }
    }
}

/// Process-wide cache of query results.
pub struct QueryCache {
    config: SyncConfig,
    entries: DashMap<Fingerprint, Slot>,
    next_fetch_id: AtomicU64,
    events: broadcast::Sender<CacheEvent>,
}

impl QueryCache {
    pub fn new(config: SyncConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            config,
            entries: DashMap::new(),
            next_fetch_id: AtomicU64::new(1),
            events,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Subscribe to cache events.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read an entry, fetching when it is absent or stale.
    ///
    /// Concurrent callers for the same stale key share a single fetch. A
    /// failure leaves any previous value in place and is reported through the
    /// entry's `error`.
    pub async fn get<T, F, Fut>(&self, key: &Fingerprint, fetcher: F) -> CacheEntry<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        self.get_with(key, self.config.stale_time, fetcher).await
    }

    /// [`get`](Self::get) with a per-call stale time.
    pub async fn get_with<T, F, Fut>(
        &self,
        key: &Fingerprint,
        stale_time: Duration,
        fetcher: F,
    ) -> CacheEntry<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let (id, fetch) = {
            let mut slot = self.entries.entry(key.clone()).or_insert_with(Slot::new);
            slot.touched_at = Instant::now();

            if slot.is_fresh::<T>(stale_time) {
                trace!(key = %key, "cache hit");
                return slot.snapshot(key, stale_time);
            }

            let joined = slot.inflight.as_ref().map(|i| (i.id, i.future.clone()));
            match joined {
                Some((id, fetch)) => {
                    trace!(key = %key, fetch_id = id, "joining in-flight fetch");
                    (id, fetch)
                }
                None => {
                    let id = self.next_fetch_id.fetch_add(1, Ordering::Relaxed);
                    let fetch = self.start_fetch(fetcher);
                    slot.inflight = Some(Inflight {
                        id,
                        future: fetch.clone(),
                    });
                    slot.status = QueryStatus::Loading;
                    debug!(key = %key, fetch_id = id, "fetching");
                    (id, fetch)
                }
            }
        };

        let result = fetch.await;
        let applied = self.settle(key, id, result.clone());

        match self.peek_with::<T>(key, stale_time) {
            Some(entry) if applied || entry.value.is_some() => entry,
            _ => CacheEntry::detached(key, result),
        }
    }

    /// Current snapshot of an entry without fetching.
    pub fn peek<T: Send + Sync + 'static>(&self, key: &Fingerprint) -> Option<CacheEntry<T>> {
        self.peek_with(key, self.config.stale_time)
    }

    fn peek_with<T: Send + Sync + 'static>(
        &self,
        key: &Fingerprint,
        stale_time: Duration,
    ) -> Option<CacheEntry<T>> {
        self.entries
            .get(key)
            .map(|slot| slot.snapshot(key, stale_time))
    }

    /// Current value of an entry, if it holds one of type `T`.
    pub fn value<T: Send + Sync + 'static>(&self, key: &Fingerprint) -> Option<Arc<T>> {
        self.peek::<T>(key).and_then(|entry| entry.value)
    }

    fn start_fetch<T, F, Fut>(&self, fetcher: F) -> FetchFuture
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let timeout = self.config.fetch_timeout;
        async move {
            match tokio::time::timeout(timeout, fetcher()).await {
                Ok(Ok(value)) => Ok(Arc::new(value) as Value),
                Ok(Err(err)) => Err(err),
                Err(_) => Err(ApiError::Timeout),
            }
        }
        .boxed()
        .shared()
    }

    /// Apply a fetch result if `id` is still the entry's current fetch.
    fn settle(&self, key: &Fingerprint, id: u64, result: Result<Value, ApiError>) -> bool {
        let event = {
            let Some(mut slot) = self.entries.get_mut(key) else {
                trace!(key = %key, fetch_id = id, "entry gone, dropping fetch result");
                return false;
            };
            if slot.inflight.as_ref().map(|i| i.id) != Some(id) {
                trace!(key = %key, fetch_id = id, "fetch superseded, dropping result");
                return false;
            }
            slot.inflight = None;

            match result {
                Ok(value) => {
                    slot.store(value);
                    CacheEvent::Updated { key: key.clone() }
                }
                Err(error) => {
                    warn!(key = %key, error = %error, "fetch failed");
                    slot.status = QueryStatus::Error;
                    slot.error = Some(error.clone());
                    CacheEvent::Failed {
                        key: key.clone(),
                        error,
                    }
                }
            }
        };

        let _ = self.events.send(event);
        true
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Replace an entry's value and mark it fresh.
    ///
    /// An in-flight fetch for the entry is superseded.
    pub fn write<T: Send + Sync + 'static>(&self, key: &Fingerprint, value: T) {
        self.store(key, Arc::new(value));
    }

    fn store(&self, key: &Fingerprint, value: Value) {
        {
            let mut slot = self.entries.entry(key.clone()).or_insert_with(Slot::new);
            if let Some(id) = slot.inflight.take().map(|i| i.id) {
                debug!(key = %key, fetch_id = id, "write supersedes in-flight fetch");
            }
            slot.store(value);
        }
        let _ = self.events.send(CacheEvent::Updated { key: key.clone() });
    }

    /// Replace an entry's value with `f(current)`.
    ///
    /// Returns `false` and does nothing when the entry holds no value of
    /// type `T`.
    pub fn update<T, F>(&self, key: &Fingerprint, f: F) -> bool
    where
        T: Send + Sync + 'static,
        F: FnOnce(&T) -> T,
    {
        let Some(current) = self.value::<T>(key) else {
            return false;
        };
        self.write(key, f(&current));
        true
    }

    /// Patch every entry matching `filter` that holds a `T`.
    ///
    /// `f` returns `None` to leave an entry untouched. Patched entries keep
    /// their freshness and any in-flight fetch. Returns the number patched.
    pub fn update_matching<T, F>(&self, filter: &Fingerprint, f: F) -> usize
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> Option<T>,
    {
        let candidates: Vec<(Fingerprint, Arc<T>)> = self
            .entries
            .iter()
            .filter(|entry| entry.key().matches(filter))
            .filter_map(|entry| {
                let value = entry.value().value.clone()?.downcast::<T>().ok()?;
                Some((entry.key().clone(), value))
            })
            .collect();

        let mut patched = 0;
        for (key, current) in candidates {
            let Some(next) = f(&current) else {
                continue;
            };
            // The entry may have been removed since the scan
            let Some(mut slot) = self.entries.get_mut(&key) else {
                continue;
            };
            slot.value = Some(Arc::new(next));
            slot.last_updated = Some(Utc::now());
            slot.touched_at = Instant::now();
            drop(slot);
            patched += 1;
            let _ = self.events.send(CacheEvent::Updated { key });
        }
        patched
    }

    /// Mark every entry matching `filter` stale.
    ///
    /// Values stay readable; the next read refetches. In-flight fetches for
    /// matching entries are abandoned since they may predate the change.
    /// Returns the number of entries matched.
    pub fn invalidate(&self, filter: &Fingerprint) -> usize {
        let mut matched = 0;
        for mut entry in self.entries.iter_mut() {
            if !entry.key().matches(filter) {
                continue;
            }
            let slot = entry.value_mut();
            slot.invalidated = true;
            slot.detach();
            matched += 1;
        }

        debug!(filter = %filter, matched, "invalidated");
        let _ = self.events.send(CacheEvent::Invalidated {
            filter: filter.clone(),
            matched,
        });
        matched
    }

    /// Abandon the in-flight fetch for an entry, if any.
    pub fn cancel(&self, key: &Fingerprint) -> bool {
        let cancelled = self
            .entries
            .get_mut(key)
            .and_then(|mut slot| slot.detach());
        if let Some(id) = cancelled {
            debug!(key = %key, fetch_id = id, "fetch cancelled");
        }
        cancelled.is_some()
    }

    pub fn remove(&self, key: &Fingerprint) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            let _ = self.events.send(CacheEvent::Removed { key: key.clone() });
        }
        removed
    }

    /// Drop every entry. In-flight fetches complete without effect.
    pub fn clear(&self) {
        self.entries.clear();
        debug!("cache cleared");
        let _ = self.events.send(CacheEvent::Cleared);
    }

    // =========================================================================
    // Observers and garbage collection
    // =========================================================================

    /// Register interest in an entry.
    ///
    /// Observed entries are never garbage collected. When the last observer
    /// is dropped, the entry's in-flight fetch is cancelled.
    pub fn observe(self: &Arc<Self>, key: &Fingerprint) -> QueryObserver {
        {
            let mut slot = self.entries.entry(key.clone()).or_insert_with(Slot::new);
            slot.observers += 1;
            slot.touched_at = Instant::now();
        }
        QueryObserver {
            cache: Arc::clone(self),
            key: key.clone(),
        }
    }

    fn release(&self, key: &Fingerprint) {
        let Some(mut slot) = self.entries.get_mut(key) else {
            return;
        };
        slot.observers = slot.observers.saturating_sub(1);
        slot.touched_at = Instant::now();
        if slot.observers == 0 {
            if let Some(id) = slot.detach() {
                debug!(key = %key, fetch_id = id, "no observers left, fetch cancelled");
            }
        }
    }

    /// Drop entries that are unobserved, idle, and untouched for `gc_time`.
    pub fn collect_garbage(&self) -> usize {
        let gc_time = self.config.gc_time;
        let mut removed = 0;
        self.entries.retain(|_, slot| {
            let keep = slot.observers > 0
                || slot.inflight.is_some()
                || slot.touched_at.elapsed() < gc_time;
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            debug!(removed, "garbage collected cache entries");
        }
        removed
    }

    /// Run [`collect_garbage`](Self::collect_garbage) periodically until the
    /// cache is dropped.
    pub fn spawn_gc(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        let period = self.config.gc_time.max(MIN_GC_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                cache.collect_garbage();
            }
        })
    }
}

/// Handle keeping a cache entry alive.
///
/// Dropping the last observer of an entry cancels its in-flight fetch.
pub struct QueryObserver {
    cache: Arc<QueryCache>,
    key: Fingerprint,
}

impl QueryObserver {
    pub fn key(&self) -> &Fingerprint {
        &self.key
    }

    pub fn current<T: Send + Sync + 'static>(&self) -> Option<CacheEntry<T>> {
        self.cache.peek(&self.key)
    }

    pub async fn get<T, F, Fut>(&self, fetcher: F) -> CacheEntry<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        self.cache.get(&self.key, fetcher).await
    }
}

impl Drop for QueryObserver {
    fn drop(&mut self) {
        self.cache.release(&self.key);
    }
}
