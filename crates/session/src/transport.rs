// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport bound to one backend: base URL, timeout, default headers.
//!
//! The transport knows nothing about tokens beyond the shared default
//! `Authorization` header. Failures come back as a tagged [`TransportError`]
//! that the refresh coordinator dispatches on.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ApiError;

/// Connection settings for one backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    /// Whole-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Headers sent with every request.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), timeout_ms: default_timeout_ms(), headers: BTreeMap::new() }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One request against a backend, addressed relative to its base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: HeaderMap,
    pub cancel: Option<CancellationToken>,
    id: Uuid,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: HeaderMap::new(),
            cancel: None,
            id: Uuid::new_v4(),
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether this request was already replayed after a token refresh.
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    pub(crate) fn mark_retried(&mut self) {
        self.retried = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Set the `Authorization` header, replacing any override.
    pub fn authorize(&mut self, value: &str) {
        match HeaderValue::from_str(value) {
            Ok(v) => {
                self.headers.insert(AUTHORIZATION, v);
            }
            Err(e) => {
                tracing::warn!(request_id = %self.id, err = %e, "stored token is not a valid header value");
                self.headers.remove(AUTHORIZATION);
            }
        }
    }

    pub fn authorization(&self) -> Option<&str> {
        self.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
    }
}

/// Parsed response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    Empty,
}

impl ResponseBody {
    /// JSON when the content type says so and the payload parses, text otherwise.
    pub fn parse(bytes: &[u8], is_json: bool) -> Self {
        if bytes.is_empty() {
            return Self::Empty;
        }
        if is_json {
            if let Ok(value) = serde_json::from_slice(bytes) {
                return Self::Json(value);
            }
        }
        Self::Text(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Json(v) => v,
            Self::Text(s) => Value::String(s),
            Self::Empty => Value::Null,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl ApiResponse {
    /// Deserialize the payload into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let decoded = match &self.body {
            ResponseBody::Json(v) => serde_json::from_value(v.clone()),
            ResponseBody::Text(s) => serde_json::from_str(s),
            ResponseBody::Empty => serde_json::from_value(Value::Null),
        };
        decoded.map_err(|e| ApiError::Decode { message: e.to_string() })
    }
}

/// Tagged transport failure.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The caller fired the request's cancellation token.
    Cancelled { request_id: Uuid },
    /// A response arrived with a non-2xx status.
    Http { status: u16, body: Value, request_id: Uuid },
    /// Connect, timeout or protocol failure.
    Network { message: String, request_id: Uuid },
}

impl TransportError {
    pub fn request_id(&self) -> Uuid {
        match self {
            Self::Cancelled { request_id }
            | Self::Http { request_id, .. }
            | Self::Network { request_id, .. } => *request_id,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled { .. } => f.write_str("cancelled"),
            Self::Http { status, .. } => write!(f, "http status {status}"),
            Self::Network { message, .. } => f.write_str(message),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Cancelled { .. } => Self::Cancelled,
            TransportError::Http { status, body, .. } => Self::Status { status, body },
            TransportError::Network { message, .. } => Self::Network { message },
        }
    }
}

/// A configured request issuer for one backend.
pub trait Transport: Send + Sync {
    fn send<'a>(&'a self, request: &'a ApiRequest)
        -> BoxFuture<'a, Result<ApiResponse, TransportError>>;

    /// Replace (or drop, on `None`) the default `Authorization` header.
    fn set_authorization(&self, value: Option<&str>);
}

/// Install the ring crypto provider for rustls. Needed by reqwest even on
/// plain HTTP; safe to call more than once.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// [`Transport`] over a shared `reqwest` client.
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
    defaults: RwLock<HeaderMap>,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> anyhow::Result<Self> {
        install_crypto_provider();
        let mut defaults = HeaderMap::new();
        for (name, value) in &config.headers {
            defaults.insert(HeaderName::from_bytes(name.as_bytes())?, HeaderValue::from_str(value)?);
        }
        let client = reqwest::Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            client,
            defaults: RwLock::new(defaults),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Current default `Authorization` header, if any.
    pub fn default_authorization(&self) -> Option<String> {
        self.defaults
            .read()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    }

    fn url(&self, request: &ApiRequest) -> Result<Url, TransportError> {
        let raw = if request.path.starts_with('/') {
            format!("{}{}", self.base_url, request.path)
        } else {
            format!("{}/{}", self.base_url, request.path)
        };
        let mut url = Url::parse(&raw).map_err(|e| TransportError::Network {
            message: format!("invalid url {raw}: {e}"),
            request_id: request.id(),
        })?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }
        Ok(url)
    }

    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let request_id = request.id();
        let mut headers = self.defaults.read().clone();
        for (name, value) in &request.headers {
            headers.insert(name.clone(), value.clone());
        }

        let mut builder = self.client.request(request.method.clone(), self.url(request)?).headers(headers);
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let network = |e: reqwest::Error| {
            let message = if e.is_timeout() { "request timed out".to_owned() } else { e.to_string() };
            TransportError::Network { message, request_id }
        };

        let resp = builder.send().await.map_err(network)?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let is_json = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("json"));
        let bytes = resp.bytes().await.map_err(network)?;
        let body = ResponseBody::parse(&bytes, is_json);

        tracing::debug!(%request_id, method = %request.method, path = %request.path, status, "response");

        if (200..300).contains(&status) {
            Ok(ApiResponse { status, headers, body })
        } else {
            Err(TransportError::Http { status, body: body.into_value(), request_id })
        }
    }
}

impl Transport for HttpTransport {
    fn send<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> BoxFuture<'a, Result<ApiResponse, TransportError>> {
        Box::pin(async move {
            let request_id = request.id();
            match request.cancel {
                Some(ref cancel) => {
                    if cancel.is_cancelled() {
                        return Err(TransportError::Cancelled { request_id });
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => Err(TransportError::Cancelled { request_id }),
                        result = self.execute(request) => result,
                    }
                }
                None => self.execute(request).await,
            }
        })
    }

    fn set_authorization(&self, value: Option<&str>) {
        let mut defaults = self.defaults.write();
        match value.map(HeaderValue::from_str) {
            Some(Ok(v)) => {
                defaults.insert(AUTHORIZATION, v);
            }
            Some(Err(e)) => {
                tracing::warn!(err = %e, "refusing invalid default authorization header");
                defaults.remove(AUTHORIZATION);
            }
            None => {
                defaults.remove(AUTHORIZATION);
            }
        }
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
