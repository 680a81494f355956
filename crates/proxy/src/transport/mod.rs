// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the console proxy.

pub mod http;
pub mod proxy;

use std::sync::Arc;

use axum::routing::{any, get};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::state::ProxyState;

/// Build the axum `Router` with all proxy routes.
pub fn build_router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route("/api/health", get(http::health))
        // Any method, including OPTIONS pre-flight.
        .route("/api/{backend}/{*path}", any(proxy::forward))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
