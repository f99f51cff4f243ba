//! HTTP client core: request dispatch, credentials and error normalization.

use std::sync::Arc;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{ApiError, ClientConfig, QueryParams};

/// Whether a request needs the bearer credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    /// Sent without credentials.
    Public,
    /// Sent with `Authorization: Bearer <token>`; fails fast without one.
    Required,
}

/// Client for the platform REST backend.
///
/// Cloning is cheap and clones share the credential.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    config: ClientConfig,
    token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    /// Create a new client from configuration.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::InvalidConfig(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.normalized_base_url(),
            config,
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// Base URL endpoints are resolved against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Install a bearer credential.
    pub async fn set_token(&self, token: impl Into<String>) {
        *self.token.write().await = Some(token.into());
    }

    /// Current bearer credential, if any.
    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    /// Forget the bearer credential.
    pub async fn clear_token(&self) {
        *self.token.write().await = None;
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    /// `GET` an endpoint.
    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &QueryParams,
        auth: Auth,
    ) -> Result<T, ApiError> {
        self.request::<(), T>(Method::GET, endpoint, query, None, auth)
            .await
    }

    /// `POST` a JSON body to an endpoint.
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
        auth: Auth,
    ) -> Result<T, ApiError> {
        self.request(Method::POST, endpoint, &QueryParams::new(), Some(body), auth)
            .await
    }

    /// `POST` to an endpoint without a body (toggle actions).
    pub async fn post_empty<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        auth: Auth,
    ) -> Result<T, ApiError> {
        self.request::<(), T>(Method::POST, endpoint, &QueryParams::new(), None, auth)
            .await
    }

    /// `PUT` a JSON body to an endpoint.
    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
        auth: Auth,
    ) -> Result<T, ApiError> {
        self.request(Method::PUT, endpoint, &QueryParams::new(), Some(body), auth)
            .await
    }

    /// `DELETE` an endpoint.
    pub async fn delete<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        auth: Auth,
    ) -> Result<T, ApiError> {
        self.request::<(), T>(Method::DELETE, endpoint, &QueryParams::new(), None, auth)
            .await
    }

    /// Issue a request and decode the JSON response.
    ///
    /// Reads are retried with exponential backoff on transient failures;
    /// anything that changes server state is sent exactly once.
    pub async fn request<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query: &QueryParams,
        body: Option<&B>,
        auth: Auth,
    ) -> Result<T, ApiError> {
        let retries = if method == Method::GET {
            self.config.max_retries
        } else {
            0
        };

        let mut backoff = ExponentialBackoff {
            initial_interval: self.config.retry_initial_interval,
            max_interval: self.config.retry_max_interval,
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            let result = self.send_once(&method, endpoint, query, body, auth).await;

            match result {
                Err(ref e) if e.is_transient() && attempt < retries => {
                    attempt += 1;
                    let wait = backoff
                        .next_backoff()
                        .unwrap_or(self.config.retry_max_interval);
                    warn!(
                        endpoint,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "transient error, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                other => return other,
            }
        }
    }

    async fn send_once<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: &Method,
        endpoint: &str,
        query: &QueryParams,
        body: Option<&B>,
        auth: Auth,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut builder = self.http.request(method.clone(), &url);

        if !query.is_empty() {
            builder = builder.query(query.pairs());
        }

        if auth == Auth::Required {
            let token = self.token().await.ok_or(ApiError::Unauthorized)?;
            builder = builder.bearer_auth(token);
        }

        if let Some(body) = body {
            builder = builder.json(body);
        }

        debug!(%method, endpoint, "sending request");
        let response = builder.send().await?;
        self.handle_response(response, auth).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
        auth: Auth,
    ) -> Result<T, ApiError> {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED && auth == Auth::Required {
            warn!("credential rejected, clearing session");
            self.clear_token().await;
            return Err(ApiError::SessionExpired);
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::from_response(status.as_u16(), &text));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(serde_json::from_slice(b"null")?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(uri: String) -> ClientConfig {
        ClientConfig {
            retry_initial_interval: Duration::from_millis(5),
            retry_max_interval: Duration::from_millis(20),
            ..ClientConfig::new(uri)
        }
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let client = ApiClient::new(ClientConfig::new("http://localhost:8000/api/")).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000/api");
    }

    #[tokio::test]
    async fn test_public_request_has_no_credential() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/usuarios/grupos-vulnerabilidade/disponiveis"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(test_config(server.uri())).unwrap();
        client.set_token("secret").await;

        let _: serde_json::Value = client
            .get(
                "/usuarios/grupos-vulnerabilidade/disponiveis",
                &QueryParams::new(),
                Auth::Public,
            )
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_required_auth_attaches_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/usuarios/me"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(test_config(server.uri())).unwrap();
        client.set_token("secret").await;

        let value: serde_json::Value = client
            .get("/usuarios/me", &QueryParams::new(), Auth::Required)
            .await
            .unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn test_missing_credential_fails_without_request() {
        let server = MockServer::start().await;
        let client = ApiClient::new(test_config(server.uri())).unwrap();

        let result: Result<serde_json::Value, _> = client
            .get("/usuarios/me", &QueryParams::new(), Auth::Required)
            .await;

        assert_eq!(result.unwrap_err(), ApiError::Unauthorized);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_401_clears_credential() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/usuarios/me"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "detail": "Token inválido"
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(test_config(server.uri())).unwrap();
        client.set_token("stale").await;

        let result: Result<serde_json::Value, _> = client
            .get("/usuarios/me", &QueryParams::new(), Auth::Required)
            .await;

        assert_eq!(result.unwrap_err(), ApiError::SessionExpired);
        assert!(!client.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_401_on_public_call_is_a_request_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "detail": "Email ou senha incorretos"
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(test_config(server.uri())).unwrap();
        let result: Result<serde_json::Value, _> = client
            .post("/auth/login", &serde_json::json!({}), Auth::Public)
            .await;

        assert_eq!(
            result.unwrap_err(),
            ApiError::Request {
                status: 401,
                message: "Email ou senha incorretos".to_string(),
                code: None,
            }
        );
    }

    #[tokio::test]
    async fn test_query_and_body_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/usuarios/"))
            .and(query_param("estado", "SP"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/posts/"))
            .and(body_json(serde_json::json!({"titulo": "t"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(test_config(server.uri())).unwrap();
        client.set_token("secret").await;

        let query: QueryParams = [("estado", "SP")].into_iter().collect();
        let _: serde_json::Value = client.get("/usuarios/", &query, Auth::Required).await.unwrap();
        let _: serde_json::Value = client
            .post("/posts/", &serde_json::json!({"titulo": "t"}), Auth::Required)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_transient_get_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cursos/1"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cursos/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1})))
            .mount(&server)
            .await;

        let client = ApiClient::new(test_config(server.uri())).unwrap();
        client.set_token("secret").await;

        let value: serde_json::Value = client
            .get("/cursos/1", &QueryParams::new(), Auth::Required)
            .await
            .unwrap();
        assert_eq!(value["id"], 1);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_mutation_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/posts/42/curtir"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "detail": "Erro ao curtir post"
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(test_config(server.uri())).unwrap();
        client.set_token("secret").await;

        let result: Result<serde_json::Value, _> =
            client.post_empty("/posts/42/curtir", Auth::Required).await;

        assert_eq!(result.unwrap_err().status(), Some(500));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_client_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/xp/progresso"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let config = ClientConfig {
            request_timeout: Duration::from_millis(50),
            ..test_config(server.uri()).without_retries()
        };
        let client = ApiClient::new(config).unwrap();
        client.set_token("secret").await;

        let result: Result<serde_json::Value, _> = client
            .get("/xp/progresso", &QueryParams::new(), Auth::Required)
            .await;
        assert_eq!(result.unwrap_err(), ApiError::Timeout);
    }

    #[tokio::test]
    async fn test_undecodable_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cursos/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = ApiClient::new(test_config(server.uri())).unwrap();
        client.set_token("secret").await;

        let result: Result<serde_json::Value, _> = client
            .get("/cursos/1", &QueryParams::new(), Auth::Required)
            .await;
        assert!(matches!(result.unwrap_err(), ApiError::Decode(_)));
    }
}
