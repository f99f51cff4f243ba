//! Client-side data synchronization for the Inclusa client.
//!
//! Three layers sit between the views and [`inclusa_api::ApiClient`]:
//!
//! - **Query cache**: fingerprint-keyed entries with staleness, coalesced
//!   fetches, stale-while-error and explicit invalidation
//! - **Mutation executor**: runs state-changing requests and applies their
//!   declared cache writes and invalidations
//! - **Optimistic controller**: toggle interactions (likes, equipped titles)
//!   that display their predicted value immediately and reconcile or roll
//!   back when the request settles

pub mod cache;
mod config;
pub mod fingerprint;
pub mod mutation;
pub mod optimistic;

pub use cache::{CacheEntry, CacheEvent, Query, QueryCache, QueryObserver, QueryStatus};
pub use config::SyncConfig;
pub use fingerprint::{Fingerprint, KeyPart};
pub use mutation::{CacheWrite, MutationExecutor, MutationSpec, MutationStatus, PendingMutation};
pub use optimistic::{
    LikeState, Notice, NoticeLevel, OptimisticController, OptimisticMutation, Toggle, TogglePhase,
};
