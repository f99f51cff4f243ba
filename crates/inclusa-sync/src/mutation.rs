//! Mutation executor.
//!
//! A mutation is a state-changing request plus a declaration of what it does
//! to the cache: writes derived from its result and fingerprints it leaves
//! stale. Effects are applied only on success, writes before invalidations.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use inclusa_api::ApiError;

use crate::cache::QueryCache;
use crate::fingerprint::Fingerprint;

/// A deferred change to one or more cache entries.
pub struct CacheWrite {
    key: Fingerprint,
    apply: Box<dyn FnOnce(&QueryCache) + Send>,
}

impl CacheWrite {
    /// Replace the entry at `key`.
    pub fn set<T: Send + Sync + 'static>(key: Fingerprint, value: T) -> Self {
        let target = key.clone();
        Self {
            key,
            apply: Box::new(move |cache| cache.write(&target, value)),
        }
    }

    /// Replace the entry at `key` with `f(current)` if it holds a `T`.
    pub fn update<T, F>(key: Fingerprint, f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: FnOnce(&T) -> T + Send + 'static,
    {
        let target = key.clone();
        Self {
            key,
            apply: Box::new(move |cache| {
                cache.update(&target, f);
            }),
        }
    }

    /// Patch every entry matching `filter` that holds a `T`.
    pub fn patch_matching<T, F>(filter: Fingerprint, f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> Option<T> + Send + 'static,
    {
        let target = filter.clone();
        Self {
            key: filter,
            apply: Box::new(move |cache| {
                cache.update_matching(&target, f);
            }),
        }
    }

    pub fn key(&self) -> &Fingerprint {
        &self.key
    }

    pub fn apply(self, cache: &QueryCache) {
        trace!(key = %self.key, "applying cache write");
        (self.apply)(cache)
    }
}

impl fmt::Debug for CacheWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheWrite").field("key", &self.key).finish()
    }
}

/// Progress of a registered mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    Pending,
    Succeeded,
    Failed,
}

/// A mutation that has been started and not yet settled.
#[derive(Debug, Clone)]
pub struct PendingMutation {
    pub id: Uuid,
    pub label: String,
    /// Fingerprints the mutation writes or invalidates.
    pub targets: Vec<Fingerprint>,
    pub payload: Option<serde_json::Value>,
    /// Whether the UI is already showing a predicted result.
    pub predicted: bool,
    pub status: MutationStatus,
    pub started_at: DateTime<Utc>,
}

type ResultWrites<'a, T> = Box<dyn FnOnce(&T) -> Vec<CacheWrite> + Send + 'a>;

/// Request and cache effects of one mutation.
pub struct MutationSpec<'a, T> {
    label: String,
    request: BoxFuture<'a, Result<T, ApiError>>,
    targets: Vec<Fingerprint>,
    affects: Vec<Fingerprint>,
    writes: Option<ResultWrites<'a, T>>,
    payload: Option<serde_json::Value>,
    predicted: bool,
}

impl<'a, T> MutationSpec<'a, T> {
    pub fn new<Fut>(label: impl Into<String>, request: Fut) -> Self
    where
        Fut: Future<Output = Result<T, ApiError>> + Send + 'a,
    {
        Self {
            label: label.into(),
            request: request.boxed(),
            targets: Vec::new(),
            affects: Vec::new(),
            writes: None,
            payload: None,
            predicted: false,
        }
    }

    /// Invalidate entries matching `filter` after success.
    pub fn affects(mut self, filter: Fingerprint) -> Self {
        self.targets.push(filter.clone());
        self.affects.push(filter);
        self
    }

    pub fn affects_all(self, filters: impl IntoIterator<Item = Fingerprint>) -> Self {
        filters.into_iter().fold(self, Self::affects)
    }

    /// Record a fingerprint as touched without invalidating it.
    pub fn target(mut self, key: Fingerprint) -> Self {
        self.targets.push(key);
        self
    }

    /// Cache writes derived from the response, applied before invalidation.
    pub fn apply_result<F>(mut self, writes: F) -> Self
    where
        F: FnOnce(&T) -> Vec<CacheWrite> + Send + 'a,
    {
        self.writes = Some(Box::new(writes));
        self
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Mark the mutation as having an optimistic prediction on screen.
    pub fn predicted(mut self) -> Self {
        self.predicted = true;
        self
    }
}

/// Runs mutations and applies their cache effects.
pub struct MutationExecutor {
    cache: Arc<QueryCache>,
    pending: DashMap<Uuid, PendingMutation>,
}

impl MutationExecutor {
    pub fn new(cache: Arc<QueryCache>) -> Arc<Self> {
        Arc::new(Self {
            cache,
            pending: DashMap::new(),
        })
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Run a mutation.
    ///
    /// On success the declared writes are applied, then the affected
    /// fingerprints are invalidated. On failure the cache is left untouched
    /// and the error is returned as-is.
    pub async fn execute<'a, T: Send + 'a>(&self, spec: MutationSpec<'a, T>) -> Result<T, ApiError> {
        let MutationSpec {
            label,
            request,
            targets,
            affects,
            writes,
            payload,
            predicted,
        } = spec;

        let id = Uuid::new_v4();
        self.pending.insert(
            id,
            PendingMutation {
                id,
                label: label.clone(),
                targets,
                payload,
                predicted,
                status: MutationStatus::Pending,
                started_at: Utc::now(),
            },
        );
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };
        debug!(mutation = %label, %id, "mutation started");

        let result = request.await;

        match &result {
            Ok(value) => {
                self.set_status(id, MutationStatus::Succeeded);
                if let Some(writes) = writes {
                    for write in writes(value) {
                        write.apply(&self.cache);
                    }
                }
                for filter in &affects {
                    self.cache.invalidate(filter);
                }
                info!(mutation = %label, %id, "mutation succeeded");
            }
            Err(error) => {
                self.set_status(id, MutationStatus::Failed);
                warn!(mutation = %label, %id, error = %error, "mutation failed");
            }
        }

        result
    }

    /// Mutations currently in flight, oldest first.
    pub fn pending(&self) -> Vec<PendingMutation> {
        let mut pending: Vec<_> = self.pending.iter().map(|m| m.value().clone()).collect();
        pending.sort_by_key(|m| m.started_at);
        pending
    }

    /// Whether an in-flight mutation targets `key`.
    pub fn is_pending(&self, key: &Fingerprint) -> bool {
        self.pending
            .iter()
            .any(|m| m.targets.iter().any(|target| key.matches(target)))
    }

    fn set_status(&self, id: Uuid, status: MutationStatus) {
        if let Some(mut mutation) = self.pending.get_mut(&id) {
            mutation.status = status;
        }
    }
}

/// Unregisters a mutation when execution ends or is abandoned.
struct PendingGuard<'a> {
    pending: &'a DashMap<Uuid, PendingMutation>,
    id: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SyncConfig;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn setup() -> (Arc<QueryCache>, Arc<MutationExecutor>) {
        let cache = QueryCache::new(SyncConfig::default());
        let executor = MutationExecutor::new(Arc::clone(&cache));
        (cache, executor)
    }

    #[tokio::test]
    async fn test_success_writes_then_invalidates() {
        let (cache, executor) = setup();
        let list = Fingerprint::new("posts").with("recent");
        cache.write(&list, vec!["old".to_string()]);

        let created = executor
            .execute(
                MutationSpec::new("create post", async { Ok::<_, ApiError>(7i64) })
                    .apply_result(|id| {
                        vec![CacheWrite::set(
                            Fingerprint::new("post").with(*id),
                            "new".to_string(),
                        )]
                    })
                    .affects(Fingerprint::new("posts")),
            )
            .await
            .unwrap();

        assert_eq!(created, 7);
        let post = cache
            .peek::<String>(&Fingerprint::new("post").with(7))
            .unwrap();
        assert_eq!(post.data().map(String::as_str), Some("new"));
        assert!(!post.is_stale);
        assert!(cache.peek::<Vec<String>>(&list).unwrap().is_stale);
        assert!(executor.pending().is_empty());
    }

    #[tokio::test]
    async fn test_failure_leaves_cache_untouched() {
        let (cache, executor) = setup();
        let list = Fingerprint::new("posts");
        cache.write(&list, 1u32);

        let result = executor
            .execute(
                MutationSpec::new("create post", async {
                    Err::<u32, _>(ApiError::Request {
                        status: 422,
                        message: "título obrigatório".to_string(),
                        code: None,
                    })
                })
                .apply_result(|_| vec![CacheWrite::set(Fingerprint::new("posts"), 99u32)])
                .affects(Fingerprint::new("posts")),
            )
            .await;

        assert_eq!(result.unwrap_err().status(), Some(422));
        let entry = cache.peek::<u32>(&list).unwrap();
        assert_eq!(entry.data(), Some(&1));
        assert!(!entry.is_stale);
    }

    #[tokio::test]
    async fn test_pending_while_in_flight() {
        let (_cache, executor) = setup();
        let (tx, rx) = oneshot::channel::<()>();
        let key = Fingerprint::new("conversation").with(4);

        let task = {
            let executor = Arc::clone(&executor);
            let key = key.clone();
            tokio::spawn(async move {
                executor
                    .execute(
                        MutationSpec::new("send message", async move {
                            rx.await.map_err(|_| ApiError::Cancelled)
                        })
                        .affects(key)
                        .payload(serde_json::json!({"mensagem": "oi"})),
                    )
                    .await
            })
        };

        while executor.pending().is_empty() {
            tokio::task::yield_now().await;
        }
        let pending = executor.pending();
        assert_eq!(pending[0].label, "send message");
        assert_eq!(pending[0].status, MutationStatus::Pending);
        assert!(executor.is_pending(&key));

        tx.send(()).unwrap();
        task.await.unwrap().unwrap();
        assert!(executor.pending().is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_mutation_is_unregistered() {
        let (_cache, executor) = setup();

        let never = futures_util::future::pending::<Result<(), ApiError>>();
        let result = tokio::time::timeout(
            Duration::from_millis(10),
            executor.execute(MutationSpec::new("never", never)),
        )
        .await;

        assert!(result.is_err());
        assert!(executor.pending().is_empty());
    }
}
