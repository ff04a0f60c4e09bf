//! # Remote Request Operation
//!
//! One network round trip as a retryable operation: build the passive
//! [`ApiRequest`], send it once through a [`RequestExecutor`], decode the JSON
//! into the request's typed response. Retry, backoff and cancellation are
//! handled by the surrounding [`Operation`].

use super::core::OperationContext;
use super::executable::{Executable, Operation, OperationHandle};
use super::retry::RetryPolicy;
use super::states::OperationKind;
use crate::error::{PipelineError, Result};
use crate::reachability::ReachabilityMonitor;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        };
        f.write_str(method)
    }
}

/// Passive request description; performs no control flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub auth_token: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            auth_token: None,
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Serialize `body` as the JSON request body
    pub fn with_json<B: Serialize>(mut self, body: &B) -> Result<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }
}

/// A typed remote call
pub trait RemoteRequest: Send + Sync + 'static {
    type Response: DeserializeOwned + Send + 'static;

    fn to_api_request(&self) -> Result<ApiRequest>;

    /// Retry limit for this request; `None` uses the limit of the policy it runs under
    fn retry_limit(&self) -> Option<u32> {
        None
    }

    /// Failure classifier for this request
    fn must_retry_on_error(&self, error: &PipelineError) -> bool {
        error.is_retryable()
    }
}

/// Transport that performs a single request and returns the decoded JSON body
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<serde_json::Value>;
}

pub struct RemoteRequestOperation<R: RemoteRequest> {
    request: R,
    executor: Arc<dyn RequestExecutor>,
    _response: PhantomData<fn() -> R::Response>,
}

impl<R: RemoteRequest> RemoteRequestOperation<R> {
    pub fn new(request: R, executor: Arc<dyn RequestExecutor>) -> Self {
        Self {
            request,
            executor,
            _response: PhantomData,
        }
    }

    pub fn request(&self) -> &R {
        &self.request
    }

    /// Build the retryable operation; a request-specific retry limit overrides the policy's
    pub fn into_operation(
        self,
        policy: &RetryPolicy,
        reachability: Arc<dyn ReachabilityMonitor>,
    ) -> (Operation<Self>, OperationHandle<R::Response>) {
        let retry_limit = self.request.retry_limit().unwrap_or(policy.retry_limit());
        let policy = policy.clone().with_retry_limit(retry_limit);
        Operation::retryable(self, policy, reachability)
    }
}

#[async_trait]
impl<R: RemoteRequest> Executable for RemoteRequestOperation<R> {
    type Output = R::Response;

    fn kind(&self) -> OperationKind {
        OperationKind::of::<Self>()
    }

    async fn execute(&self, ctx: &OperationContext) -> Result<R::Response> {
        if ctx.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let api_request = self.request.to_api_request()?;
        debug!(
            operation_id = %ctx.id(),
            method = %api_request.method,
            path = %api_request.path,
            retry_counter = ?ctx.retry_counter(),
            "Sending remote request"
        );

        let value = self.executor.send(&api_request).await?;
        serde_json::from_value(value).map_err(|e| PipelineError::Decode {
            message: format!("{} response: {e}", api_request.path),
        })
    }

    fn is_retryable(&self, error: &PipelineError) -> bool {
        self.request.must_retry_on_error(error)
    }
}
