//! Base HTTP transport for the custodial service.
//!
//! Provides `get()` / `post()` against a configured base URL with a bearer
//! JWT header, configurable timeout, and retry with exponential backoff on
//! transient failures.

use crate::error::RpcError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use std::sync::RwLock;
use std::time::Duration;

/// Configuration for the API client.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL (e.g., `https://custody.example.com`).
    pub url: String,
    /// Bearer JWT for the bound wallet identity.
    pub token: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
    /// Number of retry attempts on transient failure.
    pub retries: u32,
    /// Initial delay between retries (doubles each attempt).
    pub retry_delay: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8444".to_string(),
            token: None,
            timeout: Duration::from_secs(30),
            retries: 2,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Async HTTP client for the custodial service's REST endpoints.
///
/// The bearer token sits behind a lock so a session token can be installed
/// or cleared without rebuilding the client.
pub struct HttpClient {
    client: reqwest::Client,
    config: ApiConfig,
    token: RwLock<Option<String>>,
}

impl HttpClient {
    /// Create a new client with the given base URL.
    pub fn new(url: &str) -> Self {
        Self::with_config(ApiConfig {
            url: url.trim_end_matches('/').to_string(),
            ..Default::default()
        })
    }

    /// Create a new client with full configuration.
    pub fn with_config(config: ApiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(4)
            .build()
            .expect("failed to create HTTP client");

        let token = RwLock::new(config.token.clone());
        Self {
            client,
            config,
            token,
        }
    }

    /// Get the configured base URL.
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Install or clear the bearer token used for subsequent requests.
    pub fn set_token(&self, token: Option<String>) {
        // A poisoned lock still holds a coherent Option; recover it rather
        // than silently dropping the token.
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }

    /// Whether a bearer token is currently installed.
    pub fn has_token(&self) -> bool {
        self.token.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    fn auth_header(&self) -> Option<HeaderValue> {
        let guard = self.token.read().unwrap_or_else(|e| e.into_inner());
        let token = guard.as_deref()?;
        HeaderValue::from_str(&format!("Bearer {}", token)).ok()
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(auth) = self.auth_header() {
            headers.insert(AUTHORIZATION, auth);
        }
        headers
    }

    /// GET a JSON endpoint, retrying transient failures.
    pub async fn get(&self, endpoint: &str) -> Result<Value, RpcError> {
        self.request(endpoint, None).await
    }

    /// POST JSON to an endpoint, retrying transient failures.
    pub async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, RpcError> {
        self.request(endpoint, Some(body)).await
    }

    async fn request(&self, endpoint: &str, body: Option<&Value>) -> Result<Value, RpcError> {
        let url = format!("{}{}", self.config.url, endpoint);
        let attempts = self.config.retries + 1;
        let mut last_err = RpcError::Timeout {
            endpoint: endpoint.to_string(),
        };

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.config.retry_delay * 2u32.saturating_pow(attempt - 1);
                log::debug!("retrying {} (attempt {}/{})", endpoint, attempt + 1, attempts);
                tokio::time::sleep(delay).await;
            }

            match self.do_request(&url, endpoint, body).await {
                Ok(val) => return Ok(val),
                Err(e) => {
                    let should_retry = e.is_transient() && attempt + 1 < attempts;
                    if !should_retry {
                        return Err(e);
                    }
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }

    async fn do_request(
        &self,
        url: &str,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value, RpcError> {
        let builder = match body {
            Some(body) => self.client.post(url).json(body),
            None => self.client.get(url),
        };

        let resp = builder
            .headers(self.build_headers())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::Timeout {
                        endpoint: endpoint.to_string(),
                    }
                } else {
                    RpcError::Http {
                        endpoint: endpoint.to_string(),
                        source: e,
                    }
                }
            })?;

        let status = resp.status().as_u16();

        if status == 401 {
            return Err(RpcError::AuthFailed {
                endpoint: endpoint.to_string(),
            });
        }

        if status >= 400 {
            let body = resp.text().await.unwrap_or_default();
            return Err(RpcError::Status {
                endpoint: endpoint.to_string(),
                status,
                message: extract_error_message(&body, status),
                body: body.chars().take(500).collect(),
            });
        }

        let text = resp.text().await.map_err(|e| RpcError::Http {
            endpoint: endpoint.to_string(),
            source: e,
        })?;
        serde_json::from_str(&text).map_err(|e| RpcError::Json {
            endpoint: endpoint.to_string(),
            detail: e.to_string(),
        })
    }
}

/// Pull a human-readable message out of an error body when it is JSON with
/// an `error` or `message` field; otherwise fall back to the status line.
fn extract_error_message(body: &str, status: u16) -> String {
    if let Ok(parsed) = serde_json::from_str::<Value>(body) {
        for key in ["error", "message", "detail"] {
            if let Some(msg) = parsed.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }
    format!("server returned status {}", status)
}
