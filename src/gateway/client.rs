use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};
use url::Url;
use uuid::Uuid;

use super::rate_limit::{RateLimitConfig, RateLimitState, RateLimiter};
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::storage::{Store, AUTH_TOKEN_KEY};

/// Per-call options. Calls are authenticated GETs unless told otherwise.
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
    pub authenticated: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            body: None,
            query: Vec::new(),
            authenticated: true,
        }
    }
}

impl CallOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Value) -> Self {
        Self::with_body(Method::POST, body)
    }

    pub fn put(body: Value) -> Self {
        Self::with_body(Method::PUT, body)
    }

    pub fn patch(body: Value) -> Self {
        Self::with_body(Method::PATCH, body)
    }

    pub fn delete() -> Self {
        Self {
            method: Method::DELETE,
            ..Self::default()
        }
    }

    fn with_body(method: Method, body: Value) -> Self {
        Self {
            method,
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn unauthenticated(mut self) -> Self {
        self.authenticated = false;
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// Normalized result of a gateway call: exactly one of `data` and `error`
/// is set. `status` is absent when no response arrived.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    pub error: Option<String>,
    pub status: Option<u16>,
}

impl<T> ApiResponse<T> {
    fn success(status: u16, data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            status: Some(status),
        }
    }

    fn failure(err: &ApiError) -> Self {
        Self {
            data: None,
            error: Some(err.to_string()),
            status: err.status(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    limiter: Arc<RateLimiter>,
    store: Arc<dyn Store>,
}

impl ApiClient {
    pub fn new(api: &ApiConfig, limits: RateLimitConfig, store: Arc<dyn Store>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        // a trailing slash keeps the last path segment when joining endpoints
        let mut base = api.base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base)?;

        Ok(Self {
            http,
            base_url,
            limiter: Arc::new(RateLimiter::new(limits)),
            store,
        })
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub async fn rate_limit_state(&self) -> RateLimitState {
        self.limiter.state().await
    }

    /// Dispatches a call and folds every failure into `ApiResponse::error`.
    pub async fn call<T: DeserializeOwned>(&self, endpoint: &str, options: CallOptions) -> ApiResponse<T> {
        match self.dispatch(endpoint, options).await {
            Ok((status, data)) => ApiResponse::success(status, data),
            Err(e) => ApiResponse::failure(&e),
        }
    }

    /// Same as [`call`](Self::call) but hands the error back to the caller.
    pub async fn call_strict<T: DeserializeOwned>(&self, endpoint: &str, options: CallOptions) -> Result<T, ApiError> {
        self.dispatch(endpoint, options).await.map(|(_, data)| data)
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(endpoint.trim_start_matches('/'))?)
    }

    async fn bearer_token(&self) -> Option<String> {
        match self.store.get(AUTH_TOKEN_KEY).await {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!("Could not read auth token from store: {}", e);
                None
            }
        }
    }

    async fn dispatch<T: DeserializeOwned>(&self, endpoint: &str, options: CallOptions) -> Result<(u16, T), ApiError> {
        let url = self.endpoint_url(endpoint)?;
        self.limiter.acquire().await?;

        let request_id = Uuid::new_v4();
        debug!(%request_id, method = %options.method, %url, "Dispatching request");

        let mut request = self.http.request(options.method.clone(), url);
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if options.authenticated {
            match self.bearer_token().await {
                Some(token) => request = request.bearer_auth(token),
                None => debug!(%request_id, "No auth token available for authenticated call"),
            }
        }
        if let Some(body) = &options.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            error!(%request_id, "Request to {} failed: {}", endpoint, e);
            ApiError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body)
                .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
            warn!(%request_id, status = status.as_u16(), "Request to {} failed: {}", endpoint, message);
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await?;
        let parsed = if bytes.is_empty() {
            serde_json::from_value(Value::Null)
        } else {
            serde_json::from_slice(&bytes)
        };
        let data = parsed.map_err(|e| ApiError::Decode(e.to_string()))?;

        Ok((status.as_u16(), data))
    }
}

/// Pulls a human-readable message out of the backend's error body.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}
