// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Error codes for responses the proxy produces itself. Upstream errors are
/// relayed verbatim and never pass through here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxyError {
    UnknownBackend,
    NotConfigured,
    UpstreamUnreachable,
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnknownBackend => StatusCode::NOT_FOUND,
            Self::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamUnreachable => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownBackend => "UNKNOWN_BACKEND",
            Self::NotConfigured => "NOT_CONFIGURED",
            Self::UpstreamUnreachable => "UPSTREAM_UNREACHABLE",
        }
    }

    pub fn with_message(self, message: impl Into<String>) -> ProxyFailure {
        ProxyFailure { code: self, message: message.into() }
    }
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A [`ProxyError`] with its message, rendered as the JSON error envelope.
#[derive(Debug, Clone)]
pub struct ProxyFailure {
    pub code: ProxyError,
    pub message: String,
}

impl IntoResponse for ProxyFailure {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody { code: self.code.as_str().to_owned(), message: self.message },
        };
        (self.code.status(), Json(body)).into_response()
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
