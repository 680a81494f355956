// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::ProxyState;
use crate::upstream::Backend;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub backends: Vec<BackendInfo>,
}

#[derive(Debug, Serialize)]
pub struct BackendInfo {
    pub name: Backend,
    pub configured: bool,
}

/// `GET /api/health`
pub async fn health(State(s): State<Arc<ProxyState>>) -> Json<HealthResponse> {
    let backends = Backend::ALL
        .into_iter()
        .map(|name| BackendInfo { name, configured: s.upstream(name).is_some() })
        .collect();
    Json(HealthResponse { status: "running".to_owned(), backends })
}
