// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reverse proxy in front of the CRM console's auth, CRM and transcripts
//! services.

pub mod config;
pub mod error;
pub mod state;
pub mod transport;
pub mod upstream;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::ProxyConfig;
use crate::state::ProxyState;
use crate::transport::build_router;

/// Run the proxy until `shutdown` fires.
pub async fn run(config: ProxyConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(ProxyState::new(config)?);

    for backend in upstream::Backend::ALL {
        match state.upstream(backend) {
            Some(client) => tracing::info!(%backend, upstream = client.base_url(), "proxying"),
            None => tracing::warn!(%backend, "no upstream configured"),
        }
    }

    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("crm-proxy listening on {addr}");
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
