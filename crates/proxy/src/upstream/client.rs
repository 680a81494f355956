// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for forwarding requests to one upstream service.

use std::time::Duration;

use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use reqwest::Client;

/// Request headers copied from the browser to the upstream.
pub const FORWARDED_HEADERS: [HeaderName; 4] = [AUTHORIZATION, COOKIE, CONTENT_TYPE, ACCEPT];

/// A request to relay, already stripped of the `/api/{backend}` prefix.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// What came back from the upstream, reduced to what the proxy relays.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub set_cookies: Vec<HeaderValue>,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_ref()
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("json"))
    }
}

/// HTTP client wrapper for one upstream service.
pub struct UpstreamClient {
    base_url: String,
    client: Client,
}

impl UpstreamClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        crm_session::transport::install_crypto_provider();
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_owned(), client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str, query: Option<&str>) -> String {
        let path = path.trim_start_matches('/');
        match query.filter(|q| !q.is_empty()) {
            Some(q) => format!("{}/{}?{}", self.base_url, path, q),
            None => format!("{}/{}", self.base_url, path),
        }
    }

    /// Relay a request and collect the response.
    pub async fn forward(&self, req: ForwardRequest) -> anyhow::Result<UpstreamResponse> {
        let url = self.url(&req.path, req.query.as_deref());

        let mut headers = HeaderMap::new();
        for name in &FORWARDED_HEADERS {
            for value in req.headers.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }

        let mut builder = self.client.request(req.method.clone(), &url).headers(headers);
        if !req.body.is_empty() {
            builder = builder.body(req.body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let content_type = resp.headers().get(CONTENT_TYPE).cloned();
        let set_cookies = resp.headers().get_all(SET_COOKIE).iter().cloned().collect();
        let body = resp.bytes().await?;

        tracing::debug!(method = %req.method, %url, status = status.as_u16(), "upstream response");
        Ok(UpstreamResponse { status, content_type, set_cookies, body })
    }
}
