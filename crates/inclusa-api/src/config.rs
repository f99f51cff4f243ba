//! Client configuration.

use std::time::Duration;

/// Backend used when nothing else is configured (local development server).
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Settings for [`crate::ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every endpoint is appended to, without a trailing slash.
    pub base_url: String,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout.
    pub request_timeout: Duration,
    /// Retries for idempotent reads after a transient failure.
    pub max_retries: u32,
    /// First retry delay; later delays grow exponentially.
    pub retry_initial_interval: Duration,
    /// Upper bound for a single retry delay.
    pub retry_max_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_initial_interval: Duration::from_millis(500),
            retry_max_interval: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Default settings against the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Disable read retries.
    pub fn without_retries(mut self) -> Self {
        self.max_retries = 0;
        self
    }

    pub(crate) fn normalized_base_url(&self) -> String {
        self.base_url.trim_end_matches('/').to_string()
    }
}
