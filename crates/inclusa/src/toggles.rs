//! Optimistic toggles backed by the platform API.

use async_trait::async_trait;

use inclusa_api::{
    ApiClient, ApiError, Comment, LikeReceipt, Page, Post, Progress, TitleReceipt, User,
};
use inclusa_sync::{CacheWrite, Fingerprint, LikeState, OptimisticMutation};

use crate::keys;

pub fn post_like_state(post: &Post) -> LikeState {
    LikeState::new(post.liked, post.like_count)
}

pub fn comment_like_state(comment: &Comment) -> LikeState {
    LikeState::new(comment.liked, comment.like_count)
}

fn with_post_like(post: &Post, state: LikeState) -> Post {
    Post {
        liked: state.liked,
        like_count: state.count,
        ..post.clone()
    }
}

fn with_comment_like(comment: &Comment, state: LikeState) -> Comment {
    Comment {
        liked: state.liked,
        like_count: state.count,
        ..comment.clone()
    }
}

/// Copy of `page` with matching items patched, or `None` if nothing matches.
fn patch_page<T: Clone>(
    page: &Page<T>,
    matches: impl Fn(&T) -> bool,
    patch: impl Fn(&T) -> T,
) -> Option<Page<T>> {
    if !page.items.iter().any(&matches) {
        return None;
    }
    let mut next = page.clone();
    for item in next.items.iter_mut() {
        if matches(item) {
            *item = patch(item);
        }
    }
    Some(next)
}

// =============================================================================
// Likes
// =============================================================================

/// Like or unlike a post.
pub struct PostLike {
    api: ApiClient,
    post_id: i64,
}

impl PostLike {
    pub fn new(api: ApiClient, post_id: i64) -> Self {
        Self { api, post_id }
    }
}

#[async_trait]
impl OptimisticMutation for PostLike {
    type Value = LikeState;
    type Response = LikeReceipt;

    fn key(&self) -> Fingerprint {
        keys::post(self.post_id)
    }

    fn label(&self, target: &LikeState) -> String {
        let verb = if target.liked { "like" } else { "unlike" };
        format!("{} post {}", verb, self.post_id)
    }

    fn predict(&self, current: &LikeState) -> LikeState {
        current.toggled()
    }

    async fn request(&self, target: &LikeState) -> Result<LikeReceipt, ApiError> {
        if target.liked {
            self.api.like_post(self.post_id).await
        } else {
            self.api.unlike_post(self.post_id).await
        }
    }

    fn reconcile(&self, predicted: LikeState, receipt: &LikeReceipt) -> LikeState {
        LikeState::new(predicted.liked, receipt.like_count)
    }

    fn settle_writes(&self, settled: &LikeState) -> Vec<CacheWrite> {
        let id = self.post_id;
        let state = *settled;
        vec![
            CacheWrite::update::<Post, _>(keys::post(id), move |post| with_post_like(post, state)),
            CacheWrite::patch_matching::<Page<Post>, _>(keys::all_posts(), move |page| {
                patch_page(page, |post| post.id == id, |post| with_post_like(post, state))
            }),
        ]
    }

    fn refresh(&self) -> Vec<Fingerprint> {
        vec![keys::post(self.post_id), keys::all_posts()]
    }

    fn success_message(&self, settled: &LikeState) -> Option<String> {
        Some(if settled.liked { "Post liked" } else { "Like removed" }.to_string())
    }

    fn failure_message(&self, error: &ApiError) -> String {
        format!("Could not update like on post {}: {}", self.post_id, error)
    }
}

/// Like or unlike a comment.
pub struct CommentLike {
    api: ApiClient,
    comment_id: i64,
    post_id: i64,
}

impl CommentLike {
    pub fn new(api: ApiClient, comment: &Comment) -> Self {
        Self {
            api,
            comment_id: comment.id,
            post_id: comment.post_id,
        }
    }
}

#[async_trait]
impl OptimisticMutation for CommentLike {
    type Value = LikeState;
    type Response = LikeReceipt;

    fn key(&self) -> Fingerprint {
        keys::comment(self.comment_id)
    }

    fn label(&self, target: &LikeState) -> String {
        let verb = if target.liked { "like" } else { "unlike" };
        format!("{} comment {}", verb, self.comment_id)
    }

    fn predict(&self, current: &LikeState) -> LikeState {
        current.toggled()
    }

    async fn request(&self, target: &LikeState) -> Result<LikeReceipt, ApiError> {
        if target.liked {
            self.api.like_comment(self.comment_id).await
        } else {
            self.api.unlike_comment(self.comment_id).await
        }
    }

    fn reconcile(&self, predicted: LikeState, receipt: &LikeReceipt) -> LikeState {
        LikeState::new(predicted.liked, receipt.like_count)
    }

    fn settle_writes(&self, settled: &LikeState) -> Vec<CacheWrite> {
        let id = self.comment_id;
        let state = *settled;
        vec![CacheWrite::patch_matching::<Page<Comment>, _>(
            keys::comments(self.post_id),
            move |page| {
                patch_page(
                    page,
                    |comment| comment.id == id,
                    |comment| with_comment_like(comment, state),
                )
            },
        )]
    }

    fn refresh(&self) -> Vec<Fingerprint> {
        vec![keys::comments(self.post_id)]
    }

    fn failure_message(&self, error: &ApiError) -> String {
        format!(
            "Could not update like on comment {}: {}",
            self.comment_id, error
        )
    }
}

// =============================================================================
// Titles
// =============================================================================

/// Equip a title (`Some(id)`) or remove the equipped one (`None`).
pub struct EquipTitle {
    api: ApiClient,
    target: Option<i64>,
}

impl EquipTitle {
    pub fn equip(api: ApiClient, title_id: i64) -> Self {
        Self {
            api,
            target: Some(title_id),
        }
    }

    pub fn remove(api: ApiClient) -> Self {
        Self { api, target: None }
    }
}

#[async_trait]
impl OptimisticMutation for EquipTitle {
    type Value = Option<i64>;
    type Response = TitleReceipt;

    fn key(&self) -> Fingerprint {
        keys::progress()
    }

    fn label(&self, target: &Option<i64>) -> String {
        match target {
            Some(id) => format!("equip title {}", id),
            None => "remove equipped title".to_string(),
        }
    }

    fn predict(&self, _current: &Option<i64>) -> Option<i64> {
        self.target
    }

    async fn request(&self, target: &Option<i64>) -> Result<TitleReceipt, ApiError> {
        match target {
            Some(id) => self.api.equip_title(*id).await,
            None => self.api.remove_equipped_title().await,
        }
    }

    fn settle_writes(&self, settled: &Option<i64>) -> Vec<CacheWrite> {
        let equipped = *settled;
        vec![
            CacheWrite::update::<Progress, _>(keys::progress(), move |progress| Progress {
                equipped_title_id: equipped,
                ..progress.clone()
            }),
            CacheWrite::update::<User, _>(keys::current_user(), move |user| User {
                equipped_title_id: equipped,
                ..user.clone()
            }),
        ]
    }

    fn refresh(&self) -> Vec<Fingerprint> {
        vec![keys::progress(), keys::current_user()]
    }

    fn success_message(&self, settled: &Option<i64>) -> Option<String> {
        Some(match settled {
            Some(_) => "Title equipped".to_string(),
            None => "Title removed".to_string(),
        })
    }

    fn failure_message(&self, error: &ApiError) -> String {
        format!("Could not change the equipped title: {}", error)
    }
}
