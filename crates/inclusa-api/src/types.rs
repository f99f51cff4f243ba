//! Wire types for the platform API.
//!
//! Field names are English on the Rust side; the backend's Portuguese field
//! names are kept through serde renames.

use serde::{Deserialize, Serialize};

/// Query-string parameters for a request.
///
/// The same pairs identify a request in the query cache, so two requests with
/// equal parameters share a cache entry regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter.
    pub fn push(&mut self, name: &str, value: impl ToString) -> &mut Self {
        self.0.push((name.to_string(), value.to_string()));
        self
    }

    /// Append a numeric parameter unless it is absent or zero.
    pub fn push_nonzero(&mut self, name: &str, value: Option<u32>) -> &mut Self {
        if let Some(v) = value.filter(|v| *v != 0) {
            self.push(name, v);
        }
        self
    }

    /// Append a text parameter unless it is absent or empty.
    pub fn push_text(&mut self, name: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            self.push(name, v);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pairs in insertion order, as sent on the wire.
    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }

    /// Pairs sorted by name then value, with exact duplicates removed.
    pub fn canonical(&self) -> Vec<(String, String)> {
        let mut pairs = self.0.clone();
        pairs.sort();
        pairs.dedup();
        pairs
    }
}

impl<K: ToString, V: ToString> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

// =============================================================================
// Users
// =============================================================================

/// A vulnerability group a user can identify with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityGroup {
    pub id: i64,
    #[serde(rename = "categoria")]
    pub category: String,
    #[serde(rename = "tipo")]
    pub kind: String,
}

/// A platform user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(rename = "nome")]
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub cep: Option<String>,
    #[serde(rename = "estado", default)]
    pub state: Option<String>,
    #[serde(rename = "cidade", default)]
    pub city: Option<String>,
    #[serde(rename = "foto_perfil", default)]
    pub photo: Option<String>,
    #[serde(rename = "xp_atual", default)]
    pub xp: i64,
    #[serde(rename = "nivel_atual", default)]
    pub level: i64,
    #[serde(rename = "titulo_equipado_id", default)]
    pub equipped_title_id: Option<i64>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(rename = "grupos_vulnerabilidade", default)]
    pub vulnerability_groups: Vec<VulnerabilityGroup>,
}

/// Filters for the user directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct UserFilters {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub state: Option<String>,
    pub city: Option<String>,
}

impl UserFilters {
    pub fn to_query(&self) -> QueryParams {
        let mut q = QueryParams::new();
        q.push_nonzero("limit", self.limit)
            .push_nonzero("offset", self.offset)
            .push_text("estado", self.state.as_deref())
            .push_text("cidade", self.city.as_deref());
        q
    }
}

/// Credentials for `POST /auth/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    #[serde(rename = "senha")]
    pub password: String,
}

/// Bearer token issued by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default, rename = "usuario", alias = "user")]
    pub user: Option<User>,
}

/// Payload for `POST /auth/registrar`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    #[serde(rename = "nome")]
    pub name: String,
    pub email: String,
    #[serde(rename = "senha")]
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cep: Option<String>,
    #[serde(rename = "estado", skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "cidade", skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(rename = "grupos_vulnerabilidade")]
    pub vulnerability_groups: Vec<i64>,
}

/// Partial profile update for `PUT /usuarios/me`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    #[serde(rename = "nome", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cep: Option<String>,
    #[serde(rename = "estado", skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "cidade", skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(rename = "grupos_vulnerabilidade", skip_serializing_if = "Option::is_none")]
    pub vulnerability_groups: Option<Vec<i64>>,
}

// =============================================================================
// Forum
// =============================================================================

/// A forum post, as seen by the requesting user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    #[serde(rename = "usuario_id")]
    pub author_id: i64,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "conteudo")]
    pub content: String,
    #[serde(rename = "categoria", default)]
    pub category: Option<String>,
    #[serde(rename = "curtidas_count", default)]
    pub like_count: u64,
    #[serde(rename = "comentarios_count", default)]
    pub comment_count: u64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(rename = "autor_nome", default)]
    pub author_name: Option<String>,
    /// Whether the requesting user liked this post.
    #[serde(rename = "curtido", default)]
    pub liked: bool,
}

/// Filters for the post feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PostFilters {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub category: Option<String>,
    pub author_id: Option<i64>,
}

impl PostFilters {
    pub fn to_query(&self) -> QueryParams {
        let mut q = QueryParams::new();
        q.push_nonzero("limit", self.limit)
            .push_nonzero("offset", self.offset)
            .push_text("categoria", self.category.as_deref());
        if let Some(author) = self.author_id.filter(|id| *id != 0) {
            q.push("usuario_id", author);
        }
        q
    }
}

/// Payload for `POST /posts/`.
#[derive(Debug, Clone, Serialize)]
pub struct NewPost {
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "conteudo")]
    pub content: String,
    #[serde(rename = "categoria", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// A comment on a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    #[serde(rename = "usuario_id")]
    pub author_id: i64,
    #[serde(rename = "conteudo")]
    pub content: String,
    #[serde(rename = "curtidas_count", default)]
    pub like_count: u64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(rename = "autor_nome", default)]
    pub author_name: Option<String>,
    #[serde(rename = "curtido", default)]
    pub liked: bool,
}

/// Payload for `POST /comentarios/`.
#[derive(Debug, Clone, Serialize)]
pub struct NewComment {
    pub post_id: i64,
    #[serde(rename = "conteudo")]
    pub content: String,
}

/// Like count returned by like/unlike routes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LikeReceipt {
    #[serde(rename = "curtidas_count")]
    pub like_count: u64,
    #[serde(rename = "mensagem", default)]
    pub message: Option<String>,
}

/// Whether the requesting user liked a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LikeStatus {
    #[serde(rename = "curtido")]
    pub liked: bool,
}

/// Generic acknowledgement body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Ack {
    #[serde(rename = "mensagem", alias = "message", default)]
    pub message: String,
}

// =============================================================================
// Courses
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "descricao", default)]
    pub description: Option<String>,
    #[serde(rename = "url_curso")]
    pub url: String,
    #[serde(rename = "imagem_url", default)]
    pub image_url: Option<String>,
    #[serde(rename = "modalidade", default)]
    pub modality: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(rename = "carga_horaria", default)]
    pub workload_hours: Option<i64>,
    #[serde(rename = "gratuito", default)]
    pub free: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CourseFilters {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl CourseFilters {
    pub fn to_query(&self) -> QueryParams {
        let mut q = QueryParams::new();
        q.push_nonzero("limit", self.limit)
            .push_nonzero("offset", self.offset);
        q
    }
}

// =============================================================================
// Chat
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    #[serde(rename = "usuario1_id")]
    pub user1_id: i64,
    #[serde(rename = "usuario2_id")]
    pub user2_id: i64,
    #[serde(rename = "ultima_mensagem", default)]
    pub last_message_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(rename = "outro_usuario_nome", default)]
    pub other_user_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    #[serde(rename = "conversa_id")]
    pub conversation_id: i64,
    #[serde(rename = "remetente_id")]
    pub sender_id: i64,
    #[serde(rename = "mensagem")]
    pub text: String,
    #[serde(rename = "data_envio", default)]
    pub sent_at: Option<String>,
    #[serde(rename = "lida", default)]
    pub read: bool,
    #[serde(rename = "remetente_nome", default)]
    pub sender_name: Option<String>,
}

/// Payload for sending a chat message.
#[derive(Debug, Clone, Serialize)]
pub struct NewMessage {
    #[serde(rename = "conversa_id")]
    pub conversation_id: i64,
    #[serde(rename = "mensagem")]
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct UnreadCount {
    #[serde(rename = "mensagens_nao_lidas", alias = "nao_lidas", default)]
    pub unread: u64,
}

// =============================================================================
// XP and levels
// =============================================================================

/// The requesting user's XP progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    #[serde(rename = "usuario_id")]
    pub user_id: i64,
    #[serde(rename = "xp_atual")]
    pub xp: i64,
    #[serde(rename = "nivel_atual")]
    pub level: i64,
    #[serde(rename = "titulo_atual", default)]
    pub current_title: Option<String>,
    #[serde(rename = "titulo_equipado_id", default)]
    pub equipped_title_id: Option<i64>,
    #[serde(rename = "progresso_proximo_nivel", default)]
    pub next_level_progress: Option<f64>,
}

/// A level and the title it unlocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelTitle {
    pub id: i64,
    #[serde(rename = "nivel")]
    pub level: i64,
    #[serde(rename = "xp_necessario")]
    pub xp_required: i64,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "descricao", default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XpEvent {
    pub id: i64,
    #[serde(rename = "acao")]
    pub action: String,
    #[serde(rename = "xp_ganho")]
    pub xp_gained: i64,
    #[serde(rename = "descricao", default)]
    pub description: Option<String>,
    #[serde(rename = "data_acao", default)]
    pub occurred_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextLevel {
    #[serde(rename = "xp_atual")]
    pub xp: i64,
    #[serde(rename = "nivel_atual")]
    pub level: i64,
    #[serde(rename = "xp_necessario_proximo_nivel", default)]
    pub xp_for_next_level: Option<i64>,
    #[serde(rename = "xp_restante", default)]
    pub xp_remaining: i64,
    #[serde(rename = "progresso_percentual", default)]
    pub percent: f64,
}

/// Response to equipping or removing a title.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TitleReceipt {
    #[serde(rename = "mensagem", default)]
    pub message: String,
    #[serde(rename = "titulo_equipado", default)]
    pub equipped_title: Option<String>,
}

// =============================================================================
// Jobs and statistics
// =============================================================================

/// Job search filters, sent as the request body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct JobFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_type: Option<String>,
}

impl JobFilters {
    /// A search runs only once a role or a location is given.
    pub fn is_searchable(&self) -> bool {
        self.field.as_deref().is_some_and(|f| !f.is_empty())
            || self.location.as_deref().is_some_and(|l| !l.is_empty())
    }

    /// Filters as key parameters for caching.
    pub fn to_query(&self) -> QueryParams {
        let mut q = QueryParams::new();
        q.push_text("field", self.field.as_deref())
            .push_text("location", self.location.as_deref())
            .push_nonzero("page", self.page)
            .push_text("sort_by", self.sort_by.as_deref())
            .push_text("job_type", self.job_type.as_deref())
            .push_text("experience_level", self.experience_level.as_deref())
            .push_text("work_type", self.work_type.as_deref());
        q
    }
}

/// A job opening from the external listing provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub job_id: String,
    pub job_position: String,
    pub job_link: String,
    pub company_name: String,
    #[serde(default)]
    pub job_location: Option<String>,
    #[serde(default)]
    pub job_posting_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub total_posts: u64,
    #[serde(rename = "total_comentarios")]
    pub total_comments: u64,
    #[serde(rename = "total_curtidas")]
    pub total_likes: u64,
    #[serde(rename = "nivel_atual")]
    pub level: i64,
    #[serde(rename = "ranking_comunidade", default)]
    pub community_rank: Option<u64>,
}
