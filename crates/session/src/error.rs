// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use serde_json::Value;

/// Errors surfaced to callers of an [`ApiClient`](crate::client::ApiClient).
///
/// Cloneable because one refresh failure is handed to every parked caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// The caller cancelled the request.
    Cancelled,
    /// The request never produced an HTTP response.
    Network { message: String },
    /// Upstream answered with a non-success status that is passed through.
    Status { status: u16, body: Value },
    /// Upstream answered 409.
    Conflict { message: String },
    /// The access token could not be refreshed; the session was torn down.
    SessionExpired { status: Option<u16>, message: String },
    /// The response body did not have the expected shape.
    Decode { message: String },
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Cancelled => "CANCELLED",
            Self::Network { .. } => "NETWORK",
            Self::Status { .. } => "STATUS",
            Self::Conflict { .. } => "CONFLICT",
            Self::SessionExpired { .. } => "SESSION_EXPIRED",
            Self::Decode { .. } => "DECODE",
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Conflict { .. } => Some(409),
            Self::SessionExpired { status, .. } => *status,
            _ => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("request cancelled"),
            Self::Network { message } => write!(f, "network error: {message}"),
            Self::Status { status, body } => match body_message(body) {
                Some(msg) => write!(f, "request failed ({status}): {msg}"),
                None => write!(f, "request failed ({status})"),
            },
            Self::Conflict { message } => f.write_str(message),
            Self::SessionExpired { message, .. } => write!(f, "logged out: {message}"),
            Self::Decode { message } => write!(f, "invalid response: {message}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// Human-readable message from an error payload: `detail` first, then `message`.
pub fn body_message(body: &Value) -> Option<&str> {
    match body {
        Value::String(s) if !s.is_empty() => Some(s.as_str()),
        Value::Object(map) => ["detail", "message"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str).filter(|s| !s.is_empty())),
        _ => None,
    }
}

/// Message for a 409 response, always prefixed with `Conflict: `.
pub fn conflict_message(body: &Value) -> String {
    let detail = body_message(body).unwrap_or("request conflicts with the current state");
    format!("Conflict: {detail}")
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
