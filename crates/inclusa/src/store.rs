//! Client-side state for the platform.
//!
//! A [`Store`] owns the query cache, the mutation executor and the optimistic
//! toggle controllers, and exposes one method per screen-level read or write.
//! Reads go through the cache with the key and stale time each resource uses;
//! writes declare which cached entries they touch so the next read is fresh.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use inclusa_api::{
    Ack, ApiClient, ApiError, Comment, Conversation, Course, CourseFilters, Created, JobFilters,
    JobPosting, LevelTitle, Message, NewComment, NewPost, NextLevel, Page, Post, PostFilters,
    ProfileUpdate, Progress, RegisterRequest, UnreadCount, User, UserFilters, UserStats,
    VulnerabilityGroup, XpEvent,
};
use inclusa_sync::{
    CacheWrite, Fingerprint, LikeState, MutationExecutor, MutationSpec, Notice, NoticeLevel,
    OptimisticController, PendingMutation, Query, QueryCache, SyncConfig,
};

use crate::keys;
use crate::toggles::{CommentLike, EquipTitle, PostLike, comment_like_state, post_like_state};

/// States and cities where registered users live.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserLocations {
    /// Unique states, sorted.
    pub states: Vec<String>,
    /// Unique cities per state, sorted.
    pub cities_by_state: BTreeMap<String, Vec<String>>,
}

impl UserLocations {
    /// Derive the directory from user profiles. Blank states and cities are skipped.
    pub fn from_users(users: &[User]) -> Self {
        let mut directory: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for user in users {
            let Some(state) = user.state.as_deref().filter(|s| !s.is_empty()) else {
                continue;
            };
            let cities = directory.entry(state.to_string()).or_default();
            if let Some(city) = user.city.as_deref().filter(|c| !c.is_empty()) {
                cities.insert(city.to_string());
            }
        }

        Self {
            states: directory.keys().cloned().collect(),
            cities_by_state: directory
                .into_iter()
                .map(|(state, cities)| (state, cities.into_iter().collect()))
                .collect(),
        }
    }

    pub fn cities(&self, state: &str) -> &[String] {
        self.cities_by_state
            .get(state)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Cached, synchronized view of the platform for one signed-in user.
///
/// Must be created inside a tokio runtime: it starts the cache's garbage
/// collector, which stops when the store is dropped.
pub struct Store {
    api: ApiClient,
    cache: Arc<QueryCache>,
    executor: Arc<MutationExecutor>,
    likes: OptimisticController<LikeState>,
    titles: OptimisticController<Option<i64>>,
    notices: broadcast::Sender<Notice>,
    gc: JoinHandle<()>,
}

impl Store {
    pub fn new(api: ApiClient, config: SyncConfig) -> Self {
        let cache = QueryCache::new(config);
        let executor = MutationExecutor::new(Arc::clone(&cache));
        let (notices, _) = broadcast::channel(64);
        let likes = OptimisticController::new(Arc::clone(&executor), notices.clone());
        let titles = OptimisticController::new(Arc::clone(&executor), notices.clone());
        let gc = cache.spawn_gc();

        Self {
            api,
            cache,
            executor,
            likes,
            titles,
            notices,
            gc,
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Success and error notices from optimistic toggles and session changes.
    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Mutations currently in flight.
    pub fn pending_mutations(&self) -> Vec<PendingMutation> {
        self.executor.pending()
    }

    /// Read through the cache, fetching with a clone of the client when needed.
    ///
    /// A failed refetch still returns the previous value, carrying the error.
    async fn query<T, F, Fut>(
        &self,
        key: Fingerprint,
        stale_time: Option<Duration>,
        fetch: F,
    ) -> Result<Query<T>, ApiError>
    where
        T: Send + Sync + 'static,
        F: FnOnce(ApiClient) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let api = self.api.clone();
        let stale_time = stale_time.unwrap_or(self.cache.config().stale_time);
        let entry = self
            .cache
            .get_with(&key, stale_time, move || fetch(api))
            .await;

        if let Some(error) = entry.error.as_ref().filter(|e| e.is_fatal()) {
            let error = error.clone();
            self.end_session();
            return Err(error);
        }
        entry.into_query()
    }

    async fn mutate<'a, T: Send + 'a>(&self, spec: MutationSpec<'a, T>) -> Result<T, ApiError> {
        let result = self.executor.execute(spec).await;
        if result.as_ref().is_err_and(ApiError::is_fatal) {
            self.end_session();
        }
        result
    }

    /// Forget everything the previous session knew.
    fn reset(&self) {
        self.likes.clear();
        self.titles.clear();
        self.cache.clear();
    }

    fn end_session(&self) {
        warn!("session expired, clearing cached state");
        self.reset();
        let _ = self.notices.send(Notice {
            level: NoticeLevel::Error,
            message: "Session expired, please log in again".to_string(),
        });
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Log in, replacing any cached state, and return the signed-in user.
    pub async fn login(&self, email: &str, password: &str) -> Result<Arc<User>, ApiError> {
        let response = self
            .mutate(MutationSpec::new("login", self.api.login(email, password)))
            .await?;

        self.reset();
        if let Some(user) = response.user {
            self.cache.write(&keys::current_user(), user);
        }
        info!(email, "logged in");
        self.current_user().await.map(Query::into_value)
    }

    /// Create an account. The caller still has to log in.
    pub async fn register(&self, request: &RegisterRequest) -> Result<User, ApiError> {
        self.mutate(
            MutationSpec::new("register", self.api.register(request))
                .affects(keys::all_users()),
        )
        .await
    }

    pub async fn logout(&self) {
        self.api.logout().await;
        self.reset();
        info!("logged out");
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub async fn users(&self, filters: &UserFilters) -> Result<Query<Page<User>>, ApiError> {
        let filters_owned = filters.clone();
        self.query(keys::users(filters), None, move |api| async move {
            api.users(&filters_owned).await
        })
        .await
    }

    pub async fn user(&self, id: i64) -> Result<Query<User>, ApiError> {
        self.query(keys::user(id), None, move |api| async move { api.user(id).await })
            .await
    }

    pub async fn current_user(&self) -> Result<Query<User>, ApiError> {
        self.query(
            keys::current_user(),
            Some(keys::CURRENT_USER_STALE),
            |api| async move { api.current_user().await },
        )
        .await
    }

    pub async fn vulnerability_groups(
        &self,
    ) -> Result<Query<Vec<VulnerabilityGroup>>, ApiError> {
        self.query(
            keys::vulnerability_groups(),
            Some(keys::VULNERABILITY_GROUPS_STALE),
            |api| async move { api.vulnerability_groups().await },
        )
        .await
    }

    /// Location directory derived from a large sample of user profiles.
    pub async fn user_locations(&self) -> Result<Query<UserLocations>, ApiError> {
        self.query(
            keys::user_locations(),
            Some(keys::USER_LOCATIONS_STALE),
            |api| async move {
                let filters = UserFilters {
                    limit: Some(keys::LOCATION_SAMPLE),
                    ..Default::default()
                };
                let page = api.users(&filters).await?;
                Ok(UserLocations::from_users(&page.items))
            },
        )
        .await
    }

    /// Save profile changes and show them immediately.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        self.mutate(
            MutationSpec::new("update profile", self.api.update_profile(update))
                .apply_result(|user: &User| {
                    vec![
                        CacheWrite::set(keys::current_user(), user.clone()),
                        CacheWrite::set(keys::user(user.id), user.clone()),
                    ]
                })
                .affects(keys::current_user()),
        )
        .await
    }

    pub async fn remove_profile_photo(&self) -> Result<Ack, ApiError> {
        self.mutate(
            MutationSpec::new("remove profile photo", self.api.remove_profile_photo())
                .affects(keys::current_user()),
        )
        .await
    }

    // =========================================================================
    // Forum
    // =========================================================================

    pub async fn posts(&self, filters: &PostFilters) -> Result<Query<Page<Post>>, ApiError> {
        let filters_owned = filters.clone();
        self.query(keys::posts(filters), None, move |api| async move {
            api.posts(&filters_owned).await
        })
        .await
    }

    pub async fn post(&self, id: i64) -> Result<Query<Post>, ApiError> {
        self.query(keys::post(id), None, move |api| async move {
            api.post_by_id(id).await
        })
        .await
    }

    pub async fn comments(&self, post_id: i64) -> Result<Query<Page<Comment>>, ApiError> {
        self.query(keys::comments(post_id), None, move |api| async move {
            api.comments_for_post(post_id, 0, 0).await
        })
        .await
    }

    pub async fn create_post(&self, post: &NewPost) -> Result<Created<Post>, ApiError> {
        self.mutate(
            MutationSpec::new("create post", self.api.create_post(post))
                .apply_result(|created: &Created<Post>| match created {
                    Created::Record(post) => vec![CacheWrite::set(keys::post(post.id), post.clone())],
                    Created::Ack { .. } => Vec::new(),
                })
                .affects(keys::all_posts()),
        )
        .await
    }

    pub async fn delete_post(&self, id: i64) -> Result<Ack, ApiError> {
        self.mutate(
            MutationSpec::new(format!("delete post {}", id), self.api.delete_post(id))
                .affects_all([keys::all_posts(), keys::post(id), keys::comments(id)]),
        )
        .await
    }

    pub async fn create_comment(&self, comment: &NewComment) -> Result<Created<Comment>, ApiError> {
        self.mutate(
            MutationSpec::new(
                format!("comment on post {}", comment.post_id),
                self.api.create_comment(comment),
            )
            .affects_all([keys::comments(comment.post_id), keys::post(comment.post_id)]),
        )
        .await
    }

    pub async fn delete_comment(&self, comment: &Comment) -> Result<Ack, ApiError> {
        self.mutate(
            MutationSpec::new(
                format!("delete comment {}", comment.id),
                self.api.delete_comment(comment.id),
            )
            .affects_all([keys::comments(comment.post_id), keys::post(comment.post_id)]),
        )
        .await
    }

    /// Like or unlike a post, showing the result before the backend answers.
    pub async fn toggle_post_like(&self, post_id: i64) -> Result<LikeState, ApiError> {
        let post = self.post(post_id).await?;
        let mutation = PostLike::new(self.api.clone(), post_id);
        self.likes.apply(&mutation, &post_like_state(&post)).await
    }

    /// Like or unlike a comment, showing the result before the backend answers.
    pub async fn toggle_comment_like(&self, comment: &Comment) -> Result<LikeState, ApiError> {
        let authoritative = self
            .cache
            .value::<Page<Comment>>(&keys::comments(comment.post_id))
            .and_then(|page| {
                page.items
                    .iter()
                    .find(|c| c.id == comment.id)
                    .map(comment_like_state)
            })
            .unwrap_or_else(|| comment_like_state(comment));

        let mutation = CommentLike::new(self.api.clone(), comment);
        self.likes.apply(&mutation, &authoritative).await
    }

    /// Like state to render for a post, including unsettled toggles.
    pub fn post_like_display(&self, post: &Post) -> LikeState {
        self.likes
            .display(&keys::post(post.id), &post_like_state(post))
    }

    pub fn comment_like_display(&self, comment: &Comment) -> LikeState {
        self.likes
            .display(&keys::comment(comment.id), &comment_like_state(comment))
    }

    // =========================================================================
    // Courses
    // =========================================================================

    pub async fn courses(&self, filters: &CourseFilters) -> Result<Query<Page<Course>>, ApiError> {
        let filters_owned = filters.clone();
        self.query(keys::courses(filters), None, move |api| async move {
            api.courses(&filters_owned).await
        })
        .await
    }

    pub async fn course(&self, id: i64) -> Result<Query<Course>, ApiError> {
        self.query(keys::course(id), None, move |api| async move {
            api.course(id).await
        })
        .await
    }

    pub async fn course_areas(&self) -> Result<Query<Vec<String>>, ApiError> {
        self.query(
            keys::course_areas(),
            Some(keys::COURSE_AREAS_STALE),
            |api| async move { api.course_areas().await },
        )
        .await
    }

    // =========================================================================
    // XP
    // =========================================================================

    pub async fn progress(&self) -> Result<Query<Progress>, ApiError> {
        self.query(keys::progress(), None, |api| async move {
            api.progress().await
        })
        .await
    }

    pub async fn xp_history(&self, limit: u32) -> Result<Query<Vec<XpEvent>>, ApiError> {
        self.query(keys::xp_history(limit), None, move |api| async move {
            api.xp_history(limit).await
        })
        .await
    }

    pub async fn levels(&self) -> Result<Query<Vec<LevelTitle>>, ApiError> {
        self.query(keys::levels(), Some(keys::LEVELS_STALE), |api| async move {
            api.levels().await
        })
        .await
    }

    pub async fn next_level(&self) -> Result<Query<NextLevel>, ApiError> {
        self.query(keys::next_level(), None, |api| async move {
            api.next_level().await
        })
        .await
    }

    pub async fn equip_title(&self, title_id: i64) -> Result<Option<i64>, ApiError> {
        let progress = self.progress().await?;
        let mutation = EquipTitle::equip(self.api.clone(), title_id);
        self.titles
            .apply(&mutation, &progress.equipped_title_id)
            .await
    }

    pub async fn remove_title(&self) -> Result<Option<i64>, ApiError> {
        let progress = self.progress().await?;
        let mutation = EquipTitle::remove(self.api.clone());
        self.titles
            .apply(&mutation, &progress.equipped_title_id)
            .await
    }

    /// Equipped title to render, including an unsettled change.
    pub fn equipped_title_display(&self, progress: &Progress) -> Option<i64> {
        self.titles
            .display(&keys::progress(), &progress.equipped_title_id)
    }

    // =========================================================================
    // Chat
    // =========================================================================

    pub async fn conversations(&self) -> Result<Query<Page<Conversation>>, ApiError> {
        self.query(keys::conversations(), None, |api| async move {
            api.conversations().await
        })
        .await
    }

    pub async fn messages(&self, conversation_id: i64) -> Result<Query<Page<Message>>, ApiError> {
        self.query(
            keys::messages(conversation_id),
            None,
            move |api| async move { api.messages(conversation_id, 0, 0).await },
        )
        .await
    }

    /// Existing conversation with another user, if any.
    pub async fn conversation_with(
        &self,
        user_id: i64,
    ) -> Result<Query<Option<Conversation>>, ApiError> {
        self.query(
            keys::conversation_with(user_id),
            None,
            move |api| async move { api.find_conversation(user_id).await },
        )
        .await
    }

    pub async fn unread_count(&self) -> Result<Query<UnreadCount>, ApiError> {
        self.query(keys::unread_count(), None, |api| async move {
            api.unread_count().await
        })
        .await
    }

    pub async fn create_conversation(
        &self,
        other_user_id: i64,
    ) -> Result<Created<Conversation>, ApiError> {
        self.mutate(
            MutationSpec::new(
                format!("start conversation with {}", other_user_id),
                self.api.create_conversation(other_user_id),
            )
            .affects_all([keys::conversations(), keys::conversation_with(other_user_id)]),
        )
        .await
    }

    /// The conversation with `user_id`, starting one if none exists.
    pub async fn open_conversation(&self, user_id: i64) -> Result<Conversation, ApiError> {
        if let Some(existing) = self.conversation_with(user_id).await?.as_ref() {
            return Ok(existing.clone());
        }

        match self.create_conversation(user_id).await? {
            Created::Record(conversation) => Ok(conversation),
            Created::Ack { .. } => self
                .conversation_with(user_id)
                .await?
                .value
                .as_ref()
                .clone()
                .ok_or_else(|| {
                    ApiError::Decode("conversation was created but not returned".to_string())
                }),
        }
    }

    pub async fn send_message(
        &self,
        conversation_id: i64,
        text: &str,
    ) -> Result<Created<Message>, ApiError> {
        self.mutate(
            MutationSpec::new(
                format!("send message to conversation {}", conversation_id),
                self.api.send_message(conversation_id, text),
            )
            .affects_all([
                keys::messages(conversation_id),
                keys::conversations(),
                keys::unread_count(),
            ]),
        )
        .await
    }

    // =========================================================================
    // Jobs and statistics
    // =========================================================================

    /// Job search. Nothing is fetched until a role or a location is given.
    pub async fn search_jobs(
        &self,
        filters: &JobFilters,
    ) -> Result<Option<Query<Page<JobPosting>>>, ApiError> {
        if !filters.is_searchable() {
            return Ok(None);
        }
        let filters_owned = filters.clone();
        self.query(keys::jobs(filters), None, move |api| async move {
            api.search_jobs(&filters_owned).await
        })
        .await
        .map(Some)
    }

    pub async fn user_stats(&self, user_id: Option<i64>) -> Result<Query<UserStats>, ApiError> {
        self.query(keys::user_stats(user_id), None, move |api| async move {
            api.user_stats(user_id).await
        })
        .await
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.gc.abort();
    }
}
