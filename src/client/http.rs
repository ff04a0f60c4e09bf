//! # HTTP Request Executor
//!
//! `reqwest`-backed [`RequestExecutor`]. Every request carries the
//! application code authorization header; per-request headers and the request's
//! auth token are added on top. The base URL can be swapped at runtime when the
//! backend announces a new one.

use crate::constants::APPLICATION_CODE_HEADER;
use crate::error::{classify_http_status, PipelineError, Result};
use crate::operation::{ApiRequest, HttpMethod, RequestExecutor};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, Method, Url};
use std::time::Duration;
use tracing::{debug, error, info};

/// Configuration for the backend HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL of the backend (e.g., "<https://api.example.com>")
    pub base_url: String,
    /// Application code sent as `Authorization: App <code>`
    pub application_code: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            application_code: String::new(),
            timeout_ms: 30000,
        }
    }
}

pub struct HttpRequestExecutor {
    client: Client,
    base_url: RwLock<Url>,
    config: HttpClientConfig,
}

impl std::fmt::Debug for HttpRequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRequestExecutor")
            .field("base_url", &self.base_url.read().as_str())
            .field("timeout_ms", &self.config.timeout_ms)
            .finish()
    }
}

impl HttpRequestExecutor {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let base_url = parse_base_url(&config.base_url)?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(format!("courier-core/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                PipelineError::Configuration(format!("Failed to create HTTP client: {e}"))
            })?;

        info!(
            base_url = %base_url,
            timeout_ms = config.timeout_ms,
            "Created HttpRequestExecutor"
        );

        Ok(Self {
            client,
            base_url: RwLock::new(base_url),
            config,
        })
    }

    pub fn base_url(&self) -> String {
        self.base_url.read().to_string()
    }

    /// Point subsequent requests at a new backend
    pub fn set_base_url(&self, base_url: &str) -> Result<()> {
        let parsed = parse_base_url(base_url)?;
        info!(base_url = %parsed, "Backend base URL changed");
        *self.base_url.write() = parsed;
        Ok(())
    }

    /// Resolve `path` below the base URL, keeping any path prefix the base carries
    fn url_for(&self, path: &str) -> Result<Url> {
        self.base_url
            .read()
            .join(path.trim_start_matches('/'))
            .map_err(|e| PipelineError::Validation {
                message: format!("Invalid request path '{path}': {e}"),
            })
    }

    fn map_send_error(&self, path: &str, error: reqwest::Error) -> PipelineError {
        if error.is_timeout() {
            PipelineError::Timeout {
                operation: path.to_string(),
                timeout_ms: self.config.timeout_ms,
            }
        } else {
            PipelineError::network(format!("Request to {path} failed: {error}"))
        }
    }
}

fn parse_base_url(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url).map_err(|e| {
        PipelineError::Configuration(format!("Invalid base URL '{base_url}': {e}"))
    })?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

#[async_trait]
impl RequestExecutor for HttpRequestExecutor {
    async fn send(&self, request: &ApiRequest) -> Result<serde_json::Value> {
        let url = self.url_for(&request.path)?;
        debug!(method = %request.method, url = %url, "Sending backend request");

        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), url)
            .header(
                APPLICATION_CODE_HEADER,
                format!("App {}", self.config.application_code),
            );
        if let Some(token) = &request.auth_token {
            builder = builder.bearer_auth(token);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.map_send_error(&request.path, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.map_send_error(&request.path, e))?;

        if !status.is_success() {
            error!(
                path = %request.path,
                status = status.as_u16(),
                body = %text,
                "Backend request failed"
            );
            return Err(classify_http_status(status.as_u16(), text));
        }

        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| PipelineError::Decode {
            message: format!("Failed to parse response from {}: {e}", request.path),
        })
    }
}
