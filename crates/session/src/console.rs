// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wiring for the three console backends.
//!
//! Each backend gets its own transport and coordinator. The session store,
//! the refresh gate and the event channel are shared.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::auth::AuthApi;
use crate::client::ApiClient;
use crate::coordinator::{HttpRefresher, RefreshCoordinator, RefreshGate, Refresher};
use crate::events::SessionEvent;
use crate::storage::{FileStore, MemoryStore, SessionStore};
use crate::transport::{ClientConfig, HttpTransport, Transport};

/// Console configuration, loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    pub auth: ClientConfig,
    pub crm: ClientConfig,
    pub transcripts: ClientConfig,
    /// Where the application navigates once the session cannot be recovered.
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_login_endpoint")]
    pub login_endpoint: String,
    #[serde(default = "default_logout_endpoint")]
    pub logout_endpoint: String,
    /// Persist the session here. In-memory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<PathBuf>,
}

fn default_login_path() -> String {
    "/login".to_owned()
}

fn default_refresh_path() -> String {
    "/auth/refresh".to_owned()
}

fn default_login_endpoint() -> String {
    "/auth/login".to_owned()
}

fn default_logout_endpoint() -> String {
    "/auth/logout".to_owned()
}

impl ConsoleConfig {
    /// Config with default paths for the given backend base URLs.
    pub fn new(auth: &str, crm: &str, transcripts: &str) -> Self {
        Self {
            auth: ClientConfig::new(auth),
            crm: ClientConfig::new(crm),
            transcripts: ClientConfig::new(transcripts),
            login_path: default_login_path(),
            refresh_path: default_refresh_path(),
            login_endpoint: default_login_endpoint(),
            logout_endpoint: default_logout_endpoint(),
            storage_path: None,
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

pub struct Console {
    store: Arc<dyn SessionStore>,
    events: broadcast::Sender<SessionEvent>,
    auth: ApiClient,
    crm: ApiClient,
    transcripts: ApiClient,
    auth_api: AuthApi,
}

impl Console {
    pub fn new(config: &ConsoleConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn SessionStore> = match config.storage_path {
            Some(ref path) => Arc::new(FileStore::open(path)?),
            None => Arc::new(MemoryStore::new()),
        };
        Self::with_store(config, store)
    }

    pub fn with_store(config: &ConsoleConfig, store: Arc<dyn SessionStore>) -> anyhow::Result<Self> {
        let (events, _) = broadcast::channel(64);
        let gate = Arc::new(RefreshGate::new());

        // Refresh and login go through a transport no coordinator watches.
        let bare_auth: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config.auth)?);
        let refresher: Arc<dyn Refresher> =
            Arc::new(HttpRefresher::new(Arc::clone(&bare_auth), config.refresh_path.as_str()));

        let build = |cfg: &ClientConfig| -> anyhow::Result<ApiClient> {
            let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(cfg)?);
            let coordinator = RefreshCoordinator::new(
                Arc::clone(&store),
                Arc::clone(&refresher),
                Arc::clone(&transport),
                events.clone(),
                config.login_path.as_str(),
            )
            .with_gate(Arc::clone(&gate));
            let coordinator = Arc::new(coordinator);
            Ok(ApiClient::new(transport, coordinator, Arc::clone(&store)))
        };

        let auth = build(&config.auth)?;
        let crm = build(&config.crm)?;
        let transcripts = build(&config.transcripts)?;
        let auth_api = AuthApi::new(
            bare_auth,
            auth.clone(),
            Arc::clone(&store),
            events.clone(),
            config.login_endpoint.as_str(),
            config.logout_endpoint.as_str(),
        );

        tracing::debug!(
            auth = %config.auth.base_url,
            crm = %config.crm.base_url,
            transcripts = %config.transcripts.base_url,
            "console clients ready"
        );
        Ok(Self { store, events, auth, crm, transcripts, auth_api })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn auth(&self) -> &ApiClient {
        &self.auth
    }

    pub fn crm(&self) -> &ApiClient {
        &self.crm
    }

    pub fn transcripts(&self) -> &ApiClient {
        &self.transcripts
    }

    pub fn auth_api(&self) -> &AuthApi {
        &self.auth_api
    }
}

#[cfg(test)]
#[path = "console_tests.rs"]
mod tests;
