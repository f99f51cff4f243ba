//! Error types for the platform client.

use serde::Deserialize;
use thiserror::Error;

/// Structured error codes meaning "the entity is already in the requested state".
const ALREADY_APPLIED_CODES: &[&str] = &["already_liked", "not_liked", "already_in_state"];

/// Message fragments the backend uses for the same conflict when it sends no code.
const LEGACY_ALREADY_APPLIED: &[&str] = &["já curtiu", "não curtiu"];

/// Errors that can occur when talking to the platform backend.
///
/// Cloneable so every waiter on a coalesced fetch observes the same failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The request never completed.
    #[error("network error: {0}")]
    Network(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The backend answered with a non-2xx status.
    #[error("request failed ({status}): {message}")]
    Request {
        status: u16,
        message: String,
        /// Machine-readable error code, when the backend provides one.
        code: Option<String>,
    },

    /// The fetch was abandoned before it produced a result.
    #[error("request cancelled")]
    Cancelled,

    /// A protected call was attempted without a credential.
    #[error("authentication required: no credential available")]
    Unauthorized,

    /// The backend rejected the credential; it has been cleared.
    #[error("session expired")]
    SessionExpired,

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),

    /// The client could not be configured.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ApiError {
    /// Build a request error from a non-2xx status and its raw body.
    ///
    /// The message comes from the body's `detail` or `message` field, falling
    /// back to a generic status-based string.
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<ErrorBody>(body).ok();
        let code = parsed.as_ref().and_then(|b| b.code.clone());
        let message = parsed
            .and_then(ErrorBody::into_message)
            .unwrap_or_else(|| format!("request failed with status {}", status));

        Self::Request {
            status,
            message,
            code,
        }
    }

    /// HTTP status, for request errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Only an expired session ends the current session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }

    /// Whether retrying the same request might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Request { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the backend refused a toggle because the entity is already in
    /// the requested state (e.g. liking an already-liked post).
    pub fn is_already_applied(&self) -> bool {
        let Self::Request {
            status,
            message,
            code,
        } = self
        else {
            return false;
        };

        match code {
            Some(code) => ALREADY_APPLIED_CODES.contains(&code.as_str()),
            None => {
                (*status == 400 || *status == 409)
                    && LEGACY_ALREADY_APPLIED
                        .iter()
                        .any(|fragment| message.contains(fragment))
            }
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else if err.is_builder() {
            Self::InvalidConfig(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Error body returned by the backend.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<Detail>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// `detail` is a string for application errors and a list for validation errors.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Detail {
    Text(String),
    Validation(Vec<ValidationItem>),
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct ValidationItem {
    msg: String,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        let detail = match self.detail {
            Some(Detail::Text(text)) if !text.is_empty() => Some(text),
            Some(Detail::Validation(items)) => items.into_iter().next().map(|item| item.msg),
            _ => None,
        };
        detail.or(self.message.filter(|m| !m.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(r#"{"detail": "Post não encontrado"}"#, "Post não encontrado" ; "detail string")]
    #[test_case(r#"{"message": "Falha interna"}"#, "Falha interna" ; "message field")]
    #[test_case(r#"{"detail": "primeiro", "message": "segundo"}"#, "primeiro" ; "detail wins")]
    #[test_case(r#"{"detail": [{"loc": ["body"], "msg": "campo obrigatório", "type": "missing"}]}"#, "campo obrigatório" ; "validation list")]
    #[test_case("not json", "request failed with status 500" ; "unparseable body")]
    #[test_case("{}", "request failed with status 500" ; "empty object")]
    fn test_message_extraction(body: &str, expected: &str) {
        let err = ApiError::from_response(500, body);
        match err {
            ApiError::Request { message, .. } => assert_eq!(message, expected),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_code_is_captured() {
        let err = ApiError::from_response(409, r#"{"detail": "x", "code": "already_liked"}"#);
        assert_eq!(
            err,
            ApiError::Request {
                status: 409,
                message: "x".to_string(),
                code: Some("already_liked".to_string()),
            }
        );
        assert!(err.is_already_applied());
    }

    #[test]
    fn test_legacy_already_liked_message() {
        let err = ApiError::from_response(400, r#"{"detail": "Você já curtiu este post"}"#);
        assert!(err.is_already_applied());

        let err = ApiError::from_response(400, r#"{"detail": "Você não curtiu este comentário"}"#);
        assert!(err.is_already_applied());
    }

    #[test]
    fn test_structured_code_overrides_message() {
        let err = ApiError::from_response(
            400,
            r#"{"detail": "Você já curtiu este post", "code": "rate_limited"}"#,
        );
        assert!(!err.is_already_applied());
    }

    #[test]
    fn test_server_error_is_not_already_applied() {
        let err = ApiError::from_response(500, r#"{"detail": "Erro ao curtir post"}"#);
        assert!(!err.is_already_applied());
        assert!(err.is_transient());
    }

    #[test]
    fn test_classification() {
        assert!(ApiError::SessionExpired.is_fatal());
        assert!(!ApiError::Unauthorized.is_fatal());
        assert!(ApiError::Timeout.is_transient());
        assert!(ApiError::Network("reset".into()).is_transient());
        assert!(!ApiError::from_response(404, "{}").is_transient());
        assert_eq!(ApiError::from_response(404, "{}").status(), Some(404));
    }
}
