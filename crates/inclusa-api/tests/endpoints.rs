//! Endpoint tests against a mock backend.

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use inclusa_api::{ApiClient, ApiError, ClientConfig, Created, JobFilters, NewPost, UserFilters};

async fn logged_in_client(server: &MockServer) -> ApiClient {
    let client = ApiClient::new(ClientConfig::new(server.uri()).without_retries()).unwrap();
    client.set_token("token-123").await;
    client
}

fn user_json(id: i64, state: &str, city: &str) -> serde_json::Value {
    json!({
        "id": id,
        "nome": format!("Pessoa {}", id),
        "email": format!("p{}@exemplo.org", id),
        "estado": state,
        "cidade": city,
        "xp_atual": 120,
        "nivel_atual": 2,
        "grupos_vulnerabilidade": []
    })
}

#[tokio::test]
async fn test_login_installs_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({"email": "ana@exemplo.org", "senha": "segredo"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "abc",
            "token_type": "bearer"
        })))
        .mount(&server)
        .await;

    let client = ApiClient::new(ClientConfig::new(server.uri())).unwrap();
    let response = client.login("ana@exemplo.org", "segredo").await.unwrap();

    assert_eq!(response.access_token, "abc");
    assert_eq!(client.token().await, Some("abc".to_string()));

    client.logout().await;
    assert!(!client.is_authenticated().await);
}

#[tokio::test]
async fn test_users_bare_array_is_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/usuarios/"))
        .and(query_param("estado", "SP"))
        .and(header("authorization", "Bearer token-123"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([user_json(1, "SP", "Campinas"), user_json(2, "SP", "Santos")])),
        )
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    let filters = UserFilters {
        state: Some("SP".to_string()),
        ..Default::default()
    };
    let page = client.users(&filters).await.unwrap();

    assert_eq!(page.total, 2);
    assert_eq!(page.items[1].city.as_deref(), Some("Santos"));
}

#[tokio::test]
async fn test_posts_wrapped_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/posts/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "posts": [{
                "id": 42,
                "usuario_id": 1,
                "titulo": "Vagas de costura",
                "conteudo": "Alguém conhece?",
                "curtidas_count": 5,
                "comentarios_count": 0,
                "curtido": true
            }],
            "total": 1,
            "pagina": 1,
            "por_pagina": 20,
            "total_paginas": 1
        })))
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    let page = client.posts(&Default::default()).await.unwrap();

    assert_eq!(page.page, Some(1));
    assert_eq!(page.items[0].like_count, 5);
    assert!(page.items[0].liked);
}

#[tokio::test]
async fn test_create_post_unwraps_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/posts/"))
        .and(body_json(json!({"titulo": "Olá", "conteudo": "Primeiro post"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "post": {
                "id": 7,
                "usuario_id": 1,
                "titulo": "Olá",
                "conteudo": "Primeiro post",
                "curtidas_count": 0,
                "comentarios_count": 0
            },
            "xp_ganho": 10,
            "mensagem": "Post criado com sucesso! +10 XP"
        })))
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    let created = client
        .create_post(&NewPost {
            title: "Olá".to_string(),
            content: "Primeiro post".to_string(),
            category: None,
        })
        .await
        .unwrap();

    let post = created.into_record().unwrap();
    assert_eq!(post.id, 7);
}

#[tokio::test]
async fn test_like_post_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/posts/42/curtir"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "detail": "Você já curtiu este post"
        })))
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    let err = client.like_post(42).await.unwrap_err();

    assert!(err.is_already_applied());
    assert_eq!(err.status(), Some(400));
}

#[tokio::test]
async fn test_like_comment_returns_count() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/comentarios/9/curtir"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "comentario_id": 9,
            "curtidas_count": 3,
            "mensagem": "Comentário curtido com sucesso!"
        })))
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    let receipt = client.like_comment(9).await.unwrap();
    assert_eq!(receipt.like_count, 3);
}

#[tokio::test]
async fn test_send_message_ack_only() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/conversas/4/mensagens"))
        .and(body_json(json!({"conversa_id": 4, "mensagem": "oi"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "conversa_id": 4,
            "mensagem": "Mensagem enviada com sucesso!"
        })))
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    let sent = client.send_message(4, "oi").await.unwrap();
    assert!(matches!(sent, Created::Ack { .. }));
}

#[tokio::test]
async fn test_job_search_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/trabalhos/vagas"))
        .and(body_json(json!({"field": "cozinheiro", "location": "Maringá"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sucesso": true,
            "total_vagas": 1,
            "vagas": [{
                "job_id": "abc",
                "job_position": "Cozinheiro",
                "job_link": "https://example.org/vaga/abc",
                "company_name": "Restaurante",
                "company_profile": "https://example.org/empresa",
                "job_location": "Maringá, PR",
                "job_posting_date": "2024-05-01"
            }],
            "filtros_usados": {}
        })))
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    let filters = JobFilters {
        field: Some("cozinheiro".to_string()),
        location: Some("Maringá".to_string()),
        ..Default::default()
    };
    let page = client.search_jobs(&filters).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].company_name, "Restaurante");
}

#[tokio::test]
async fn test_course_areas_wrapped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cursos/areas/disponiveis"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "areas": ["Gastronomia", "Tecnologia"],
            "total_areas": 2
        })))
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    let areas = client.course_areas().await.unwrap();
    assert_eq!(areas, vec!["Gastronomia".to_string(), "Tecnologia".to_string()]);
}

#[tokio::test]
async fn test_equip_title_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/xp/titulos/99/equipar"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "detail": "Título não encontrado"
        })))
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    let err = client.equip_title(99).await.unwrap_err();
    assert_eq!(
        err,
        ApiError::Request {
            status: 404,
            message: "Título não encontrado".to_string(),
            code: None,
        }
    );
}
