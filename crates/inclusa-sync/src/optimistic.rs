//! Optimistic toggles.
//!
//! A toggle action (like/unlike, equip/remove a title) shows its predicted
//! value the moment it starts. The prediction lives in a per-entity
//! [`Toggle`] overlaid on the cached value:
//!
//! - the display is the prediction of the most recent outstanding action, or
//!   the cached value when nothing is outstanding
//! - a success writes the settled value into the cache, unless a later action
//!   has already settled, then drops the prediction
//! - a failure drops the prediction, so the display falls back to whatever
//!   was showing before that action
//!
//! Each action predicts from the current display, so rapid repeated toggles
//! chain instead of fighting.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use inclusa_api::ApiError;

use crate::fingerprint::Fingerprint;
use crate::mutation::{CacheWrite, MutationExecutor, MutationSpec};

// =============================================================================
// Toggle state
// =============================================================================

/// Liked flag plus like count of a post or comment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LikeState {
    pub liked: bool,
    pub count: u64,
}

impl LikeState {
    pub fn new(liked: bool, count: u64) -> Self {
        Self { liked, count }
    }

    /// Flip the flag and move the count with it. Never goes below zero.
    pub fn toggled(&self) -> Self {
        if self.liked {
            Self::new(false, self.count.saturating_sub(1))
        } else {
            Self::new(true, self.count + 1)
        }
    }
}

/// What a toggle currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TogglePhase<V> {
    Settled(V),
    Pending { predicted: V, previous: V },
}

#[derive(Debug, Clone)]
struct Action<V> {
    predicted: V,
    previous: V,
}

/// Outstanding optimistic actions for one entity, stamped with versions.
#[derive(Debug, Clone)]
pub struct Toggle<V> {
    next_version: u64,
    /// Highest version whose result has been written back.
    applied_version: u64,
    outstanding: BTreeMap<u64, Action<V>>,
}

impl<V> Default for Toggle<V> {
    fn default() -> Self {
        Self {
            next_version: 0,
            applied_version: 0,
            outstanding: BTreeMap::new(),
        }
    }
}

impl<V: Clone> Toggle<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn display(&self, authoritative: &V) -> V {
        self.outstanding
            .last_key_value()
            .map(|(_, action)| action.predicted.clone())
            .unwrap_or_else(|| authoritative.clone())
    }

    pub fn phase(&self, authoritative: &V) -> TogglePhase<V> {
        match self.outstanding.last_key_value() {
            Some((_, action)) => TogglePhase::Pending {
                predicted: action.predicted.clone(),
                previous: action.previous.clone(),
            },
            None => TogglePhase::Settled(authoritative.clone()),
        }
    }

    /// Start an action. Returns its version and predicted value.
    pub fn begin(&mut self, authoritative: &V, predict: impl FnOnce(&V) -> V) -> (u64, V) {
        let version = self.next_version + 1;
        let predicted = self.begin_at(version, authoritative, predict);
        (version, predicted)
    }

    /// Start an action stamped with a version drawn from an outside counter.
    ///
    /// `version` must be higher than every version this toggle has seen.
    pub fn begin_at(
        &mut self,
        version: u64,
        authoritative: &V,
        predict: impl FnOnce(&V) -> V,
    ) -> V {
        let previous = self.display(authoritative);
        let predicted = predict(&previous);
        self.next_version = self.next_version.max(version);
        self.outstanding.insert(
            version,
            Action {
                predicted: predicted.clone(),
                previous,
            },
        );
        predicted
    }

    /// Whether a success for `version` should be written back.
    pub fn accepts(&self, version: u64) -> bool {
        version > self.applied_version && self.outstanding.contains_key(&version)
    }

    /// Settle `version` successfully. Returns whether its result was the
    /// newest to settle.
    pub fn succeed(&mut self, version: u64) -> bool {
        let accepted = self.accepts(version);
        self.outstanding.remove(&version);
        if accepted {
            self.applied_version = version;
        }
        accepted
    }

    /// Settle `version` as failed. Returns whether it was outstanding.
    pub fn fail(&mut self, version: u64) -> bool {
        self.outstanding.remove(&version).is_some()
    }

    pub fn is_idle(&self) -> bool {
        self.outstanding.is_empty()
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }
}

// =============================================================================
// Notices
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// User-facing notification emitted when an optimistic action settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

// =============================================================================
// Controller
// =============================================================================

/// A toggle request with its prediction and cache effects.
#[async_trait]
pub trait OptimisticMutation: Send + Sync {
    type Value: Clone + Send + Sync + 'static;
    type Response: Send;

    /// Entity being toggled.
    fn key(&self) -> Fingerprint;

    fn label(&self, target: &Self::Value) -> String;

    /// Value expected once the request succeeds.
    fn predict(&self, current: &Self::Value) -> Self::Value;

    /// Ask the backend to move the entity to `target`.
    async fn request(&self, target: &Self::Value) -> Result<Self::Response, ApiError>;

    /// Adjust the prediction with what the backend reported.
    fn reconcile(&self, predicted: Self::Value, _response: &Self::Response) -> Self::Value {
        predicted
    }

    /// Cache writes recording the settled value.
    fn settle_writes(&self, settled: &Self::Value) -> Vec<CacheWrite>;

    /// Fingerprints re-read from the backend shortly after settling.
    fn refresh(&self) -> Vec<Fingerprint> {
        vec![self.key()]
    }

    fn success_message(&self, _settled: &Self::Value) -> Option<String> {
        None
    }

    fn failure_message(&self, error: &ApiError) -> String {
        error.to_string()
    }
}

/// Runs optimistic toggles whose value type is `V`.
pub struct OptimisticController<V> {
    executor: Arc<MutationExecutor>,
    toggles: DashMap<Fingerprint, Toggle<V>>,
    /// Shared across keys and never reset, so a result from before
    /// [`clear`](Self::clear) can't match an action started after it.
    versions: AtomicU64,
    notices: broadcast::Sender<Notice>,
    refresh_delay: Duration,
}

impl<V: Clone + Send + Sync + 'static> OptimisticController<V> {
    pub fn new(executor: Arc<MutationExecutor>, notices: broadcast::Sender<Notice>) -> Self {
        let refresh_delay = executor.cache().config().refresh_delay;
        Self {
            executor,
            toggles: DashMap::new(),
            versions: AtomicU64::new(0),
            notices,
            refresh_delay,
        }
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Value to show for `key` given its cached value.
    pub fn display(&self, key: &Fingerprint, authoritative: &V) -> V {
        match self.toggles.get(key) {
            Some(toggle) => toggle.display(authoritative),
            None => authoritative.clone(),
        }
    }

    pub fn phase(&self, key: &Fingerprint, authoritative: &V) -> TogglePhase<V> {
        match self.toggles.get(key) {
            Some(toggle) => toggle.phase(authoritative),
            None => TogglePhase::Settled(authoritative.clone()),
        }
    }

    pub fn is_pending(&self, key: &Fingerprint) -> bool {
        self.toggles
            .get(key)
            .is_some_and(|toggle| !toggle.is_idle())
    }

    /// Number of unsettled actions on `key`.
    pub fn outstanding(&self, key: &Fingerprint) -> usize {
        self.toggles.get(key).map_or(0, |toggle| toggle.outstanding())
    }

    /// Drop every outstanding prediction.
    pub fn clear(&self) {
        self.toggles.clear();
    }

    /// Run a toggle optimistically.
    ///
    /// The predicted value is visible through [`display`](Self::display) until
    /// the request settles. A refusal meaning "already in that state" counts
    /// as success. Either way the entity is re-read after the refresh delay.
    pub async fn apply<M>(&self, mutation: &M, authoritative: &V) -> Result<V, ApiError>
    where
        M: OptimisticMutation<Value = V>,
    {
        let key = mutation.key();
        let version = self.versions.fetch_add(1, Ordering::Relaxed) + 1;
        let target = self
            .toggles
            .entry(key.clone())
            .or_default()
            .begin_at(version, authoritative, |current| mutation.predict(current));
        debug!(key = %key, version, "optimistic update shown");

        let spec = MutationSpec::new(mutation.label(&target), mutation.request(&target))
            .target(key.clone())
            .predicted();

        let result = self.executor.execute(spec).await;
        let outcome = match result {
            Ok(response) => Ok(mutation.reconcile(target.clone(), &response)),
            Err(error) if error.is_already_applied() => {
                info!(key = %key, "already in requested state");
                Ok(target)
            }
            Err(error) => Err(error),
        };

        match &outcome {
            Ok(settled) => {
                if let Some(mut toggle) = self.toggles.get_mut(&key) {
                    if toggle.accepts(version) {
                        for write in mutation.settle_writes(settled) {
                            write.apply(self.executor.cache());
                        }
                    } else {
                        debug!(key = %key, version, "newer action already settled");
                    }
                    toggle.succeed(version);
                }
                if let Some(message) = mutation.success_message(settled) {
                    self.notify(NoticeLevel::Success, message);
                }
            }
            Err(error) => {
                if let Some(mut toggle) = self.toggles.get_mut(&key) {
                    toggle.fail(version);
                }
                warn!(key = %key, version, error = %error, "optimistic update rolled back");
                self.notify(NoticeLevel::Error, mutation.failure_message(error));
            }
        }

        self.toggles.remove_if(&key, |_, toggle| toggle.is_idle());
        self.schedule_refresh(mutation.refresh());
        outcome
    }

    fn notify(&self, level: NoticeLevel, message: String) {
        let _ = self.notices.send(Notice { level, message });
    }

    fn schedule_refresh(&self, keys: Vec<Fingerprint>) {
        if keys.is_empty() {
            return;
        }
        let cache = Arc::downgrade(self.executor.cache());
        let delay = self.refresh_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(cache) = cache.upgrade() else {
                return;
            };
            for key in &keys {
                cache.invalidate(key);
            }
        });
    }
}
