//! One method per backend route.

use tracing::debug;

use crate::client::{ApiClient, Auth};
use crate::{
    Ack, ApiError, Comment, Conversation, Course, CourseFilters, Created, JobFilters, JobPosting,
    LevelTitle, LikeReceipt, LikeStatus, LoginRequest, Message, NewComment, NewMessage, NewPost,
    NextLevel, Page, Post, PostFilters, ProfileUpdate, Progress, QueryParams, RegisterRequest,
    TitleReceipt, TokenResponse, UnreadCount, User, UserFilters, UserStats, VulnerabilityGroup,
    XpEvent,
};

fn paging(limit: u32, offset: u32) -> QueryParams {
    let mut q = QueryParams::new();
    q.push_nonzero("limit", Some(limit))
        .push_nonzero("offset", Some(offset));
    q
}

/// Percent-encode a single path segment.
fn segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

// =============================================================================
// Authentication
// =============================================================================

impl ApiClient {
    /// Log in and install the returned bearer credential.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, ApiError> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response: TokenResponse = self.post("/auth/login", &request, Auth::Public).await?;
        self.set_token(response.access_token.clone()).await;
        debug!(email, "logged in");
        Ok(response)
    }

    /// Create an account. Does not log in.
    pub async fn register(&self, request: &RegisterRequest) -> Result<User, ApiError> {
        self.post("/auth/registrar", request, Auth::Public).await
    }

    /// Drop the local credential.
    pub async fn logout(&self) {
        self.clear_token().await;
    }
}

// =============================================================================
// Users
// =============================================================================

impl ApiClient {
    pub async fn users(&self, filters: &UserFilters) -> Result<Page<User>, ApiError> {
        self.get("/usuarios/", &filters.to_query(), Auth::Required)
            .await
    }

    pub async fn user(&self, id: i64) -> Result<User, ApiError> {
        self.get(&format!("/usuarios/{}", id), &QueryParams::new(), Auth::Required)
            .await
    }

    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.get("/usuarios/me", &QueryParams::new(), Auth::Required)
            .await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        self.put("/usuarios/me", update, Auth::Required).await
    }

    pub async fn remove_profile_photo(&self) -> Result<Ack, ApiError> {
        self.delete("/usuarios/me/foto", Auth::Required).await
    }

    /// Vulnerability groups offered at registration. Public.
    pub async fn vulnerability_groups(&self) -> Result<Vec<VulnerabilityGroup>, ApiError> {
        let page: Page<VulnerabilityGroup> = self
            .get(
                "/usuarios/grupos-vulnerabilidade/disponiveis",
                &QueryParams::new(),
                Auth::Public,
            )
            .await?;
        Ok(page.items)
    }
}

// =============================================================================
// Posts
// =============================================================================

impl ApiClient {
    pub async fn posts(&self, filters: &PostFilters) -> Result<Page<Post>, ApiError> {
        self.get("/posts/", &filters.to_query(), Auth::Required)
            .await
    }

    pub async fn post_by_id(&self, id: i64) -> Result<Post, ApiError> {
        self.get(&format!("/posts/{}", id), &QueryParams::new(), Auth::Required)
            .await
    }

    pub async fn create_post(&self, post: &NewPost) -> Result<Created<Post>, ApiError> {
        self.post("/posts/", post, Auth::Required).await
    }

    pub async fn like_post(&self, id: i64) -> Result<LikeReceipt, ApiError> {
        self.post_empty(&format!("/posts/{}/curtir", id), Auth::Required)
            .await
    }

    pub async fn unlike_post(&self, id: i64) -> Result<LikeReceipt, ApiError> {
        self.post_empty(&format!("/posts/{}/descurtir", id), Auth::Required)
            .await
    }

    pub async fn delete_post(&self, id: i64) -> Result<Ack, ApiError> {
        self.delete(&format!("/posts/{}", id), Auth::Required).await
    }

    pub async fn posts_by_user(
        &self,
        user_id: i64,
        limit: u32,
        offset: u32,
    ) -> Result<Page<Post>, ApiError> {
        self.get(
            &format!("/posts/usuario/{}", user_id),
            &paging(limit, offset),
            Auth::Required,
        )
        .await
    }

    pub async fn posts_by_category(
        &self,
        category: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Page<Post>, ApiError> {
        self.get(
            &format!("/posts/categoria/{}", segment(category)),
            &paging(limit, offset),
            Auth::Required,
        )
        .await
    }

    pub async fn post_like_status(&self, id: i64) -> Result<LikeStatus, ApiError> {
        self.get(
            &format!("/posts/{}/curtido", id),
            &QueryParams::new(),
            Auth::Required,
        )
        .await
    }
}

// =============================================================================
// Comments
// =============================================================================

impl ApiClient {
    pub async fn comments_for_post(
        &self,
        post_id: i64,
        limit: u32,
        offset: u32,
    ) -> Result<Page<Comment>, ApiError> {
        self.get(
            &format!("/comentarios/post/{}", post_id),
            &paging(limit, offset),
            Auth::Required,
        )
        .await
    }

    pub async fn comments_by_user(
        &self,
        user_id: i64,
        limit: u32,
        offset: u32,
    ) -> Result<Page<Comment>, ApiError> {
        self.get(
            &format!("/comentarios/usuario/{}", user_id),
            &paging(limit, offset),
            Auth::Required,
        )
        .await
    }

    pub async fn comment(&self, id: i64) -> Result<Comment, ApiError> {
        self.get(
            &format!("/comentarios/{}", id),
            &QueryParams::new(),
            Auth::Required,
        )
        .await
    }

    pub async fn create_comment(&self, comment: &NewComment) -> Result<Created<Comment>, ApiError> {
        self.post("/comentarios/", comment, Auth::Required).await
    }

    pub async fn like_comment(&self, id: i64) -> Result<LikeReceipt, ApiError> {
        self.post_empty(&format!("/comentarios/{}/curtir", id), Auth::Required)
            .await
    }

    pub async fn unlike_comment(&self, id: i64) -> Result<LikeReceipt, ApiError> {
        self.post_empty(&format!("/comentarios/{}/descurtir", id), Auth::Required)
            .await
    }

    pub async fn delete_comment(&self, id: i64) -> Result<Ack, ApiError> {
        self.delete(&format!("/comentarios/{}", id), Auth::Required)
            .await
    }
}

// =============================================================================
// Courses
// =============================================================================

impl ApiClient {
    pub async fn courses(&self, filters: &CourseFilters) -> Result<Page<Course>, ApiError> {
        self.get("/cursos/", &filters.to_query(), Auth::Required)
            .await
    }

    pub async fn course(&self, id: i64) -> Result<Course, ApiError> {
        self.get(&format!("/cursos/{}", id), &QueryParams::new(), Auth::Required)
            .await
    }

    pub async fn courses_by_area(
        &self,
        area: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Page<Course>, ApiError> {
        self.get(
            &format!("/cursos/area/{}", segment(area)),
            &paging(limit, offset),
            Auth::Required,
        )
        .await
    }

    pub async fn search_courses(
        &self,
        text: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Page<Course>, ApiError> {
        self.get(
            &format!("/cursos/buscar/{}", segment(text)),
            &paging(limit, offset),
            Auth::Required,
        )
        .await
    }

    pub async fn course_areas(&self) -> Result<Vec<String>, ApiError> {
        let page: Page<String> = self
            .get("/cursos/areas/disponiveis", &QueryParams::new(), Auth::Required)
            .await?;
        Ok(page.items)
    }
}

// =============================================================================
// Chat
// =============================================================================

impl ApiClient {
    pub async fn conversations(&self) -> Result<Page<Conversation>, ApiError> {
        self.get("/chat/conversas/", &QueryParams::new(), Auth::Required)
            .await
    }

    /// Start (or reopen) a conversation with another user.
    pub async fn create_conversation(
        &self,
        other_user_id: i64,
    ) -> Result<Created<Conversation>, ApiError> {
        self.post_empty(
            &format!("/chat/conversas/{}", other_user_id),
            Auth::Required,
        )
        .await
    }

    pub async fn messages(
        &self,
        conversation_id: i64,
        limit: u32,
        offset: u32,
    ) -> Result<Page<Message>, ApiError> {
        self.get(
            &format!("/chat/conversas/{}/mensagens", conversation_id),
            &paging(limit, offset),
            Auth::Required,
        )
        .await
    }

    pub async fn send_message(
        &self,
        conversation_id: i64,
        text: &str,
    ) -> Result<Created<Message>, ApiError> {
        let body = NewMessage {
            conversation_id,
            text: text.to_string(),
        };
        self.post(
            &format!("/chat/conversas/{}/mensagens", conversation_id),
            &body,
            Auth::Required,
        )
        .await
    }

    pub async fn unread_count(&self) -> Result<UnreadCount, ApiError> {
        self.get("/chat/nao-lidas", &QueryParams::new(), Auth::Required)
            .await
    }

    /// The conversation between the current user and another, if any.
    pub async fn find_conversation(
        &self,
        other_user_id: i64,
    ) -> Result<Option<Conversation>, ApiError> {
        self.get(
            &format!("/chat/buscar-conversa/{}", other_user_id),
            &QueryParams::new(),
            Auth::Required,
        )
        .await
    }
}

// =============================================================================
// XP
// =============================================================================

impl ApiClient {
    pub async fn progress(&self) -> Result<Progress, ApiError> {
        self.get("/xp/progresso", &QueryParams::new(), Auth::Required)
            .await
    }

    pub async fn xp_history(&self, limit: u32) -> Result<Vec<XpEvent>, ApiError> {
        let mut q = QueryParams::new();
        q.push_nonzero("limit", Some(limit));
        let page: Page<XpEvent> = self.get("/xp/historico", &q, Auth::Required).await?;
        Ok(page.items)
    }

    pub async fn levels(&self) -> Result<Vec<LevelTitle>, ApiError> {
        let page: Page<LevelTitle> = self
            .get("/xp/niveis", &QueryParams::new(), Auth::Required)
            .await?;
        Ok(page.items)
    }

    pub async fn equip_title(&self, title_id: i64) -> Result<TitleReceipt, ApiError> {
        self.post_empty(&format!("/xp/titulos/{}/equipar", title_id), Auth::Required)
            .await
    }

    pub async fn remove_equipped_title(&self) -> Result<TitleReceipt, ApiError> {
        self.post_empty("/xp/titulos/remover", Auth::Required).await
    }

    pub async fn next_level(&self) -> Result<NextLevel, ApiError> {
        self.get("/xp/proximo-nivel", &QueryParams::new(), Auth::Required)
            .await
    }
}

// =============================================================================
// Jobs and statistics
// =============================================================================

impl ApiClient {
    pub async fn search_jobs(&self, filters: &JobFilters) -> Result<Page<JobPosting>, ApiError> {
        self.post("/trabalhos/vagas", filters, Auth::Required).await
    }

    /// Statistics for a user, or for the current user when `user_id` is `None`.
    pub async fn user_stats(&self, user_id: Option<i64>) -> Result<UserStats, ApiError> {
        let endpoint = match user_id {
            Some(id) => format!("/estatisticas/usuario/{}", id),
            None => "/estatisticas/me".to_string(),
        };
        self.get(&endpoint, &QueryParams::new(), Auth::Required)
            .await
    }
}
