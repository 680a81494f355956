// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pass-through handler for `/api/{backend}/{*path}`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONTENT_TYPE, SET_COOKIE,
};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use crm_session::transport::ResponseBody;

use crate::error::{ProxyError, ProxyFailure};
use crate::state::ProxyState;
use crate::upstream::client::ForwardRequest;
use crate::upstream::Backend;

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type, Authorization, Cookie";

/// Answer a CORS pre-flight without contacting the upstream.
pub fn preflight() -> Response {
    (
        StatusCode::OK,
        [
            (ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW_ORIGIN),
            (ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS),
            (ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS),
        ],
    )
        .into_response()
}

/// `ANY /api/{backend}/{*path}`: relay to the backend's upstream.
pub async fn forward(
    State(s): State<Arc<ProxyState>>,
    Path((backend, path)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyFailure> {
    let backend: Backend =
        backend.parse().map_err(|e: String| ProxyError::UnknownBackend.with_message(e))?;

    if method == Method::OPTIONS {
        return Ok(preflight());
    }

    let upstream = s.upstream(backend).ok_or_else(|| {
        ProxyError::NotConfigured.with_message(format!("no upstream configured for {backend}"))
    })?;

    let req = ForwardRequest {
        method: method.clone(),
        path,
        query: uri.query().map(str::to_owned),
        headers,
        body,
    };
    let resp = upstream.forward(req).await.map_err(|e| {
        tracing::warn!(%backend, upstream = upstream.base_url(), err = %e, "upstream request failed");
        ProxyError::UpstreamUnreachable.with_message(format!("upstream error: {e}"))
    })?;

    let mut out = match ResponseBody::parse(&resp.body, resp.is_json()) {
        ResponseBody::Json(value) => (resp.status, Json(value)).into_response(),
        ResponseBody::Text(text) => {
            let mut r = (resp.status, text).into_response();
            if let Some(ct) = resp.content_type.clone() {
                r.headers_mut().insert(CONTENT_TYPE, ct);
            }
            r
        }
        ResponseBody::Empty => resp.status.into_response(),
    };
    for cookie in resp.set_cookies {
        out.headers_mut().append(SET_COOKIE, cookie);
    }
    tracing::debug!(%backend, %method, status = resp.status.as_u16(), "relayed");
    Ok(out)
}

