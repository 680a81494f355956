// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Login and logout against the auth backend.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::broadcast;

use crate::client::ApiClient;
use crate::error::ApiError;
use crate::events::SessionEvent;
use crate::storage::{self, SessionStore, TokenPair, USER_EMAIL};
use crate::transport::{ApiRequest, Transport};

pub struct AuthApi {
    /// Unauthenticated transport: a 401 on login means bad credentials.
    transport: Arc<dyn Transport>,
    client: ApiClient,
    store: Arc<dyn SessionStore>,
    events: broadcast::Sender<SessionEvent>,
    login_endpoint: String,
    logout_endpoint: String,
}

impl AuthApi {
    pub fn new(
        transport: Arc<dyn Transport>,
        client: ApiClient,
        store: Arc<dyn SessionStore>,
        events: broadcast::Sender<SessionEvent>,
        login_endpoint: impl Into<String>,
        logout_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            client,
            store,
            events,
            login_endpoint: login_endpoint.into(),
            logout_endpoint: logout_endpoint.into(),
        }
    }

    /// Exchange credentials for a token pair and start a session.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, ApiError> {
        let request = ApiRequest::post(self.login_endpoint.as_str())
            .json(json!({ "email": email, "password": password }));
        let pair: TokenPair = self.transport.send(&request).await?.json()?;

        storage::store_tokens(&*self.store, &pair);
        self.store.set(USER_EMAIL, email);
        tracing::info!(email, "logged in");
        let _ = self.events.send(SessionEvent::LoggedIn { email: email.to_owned() });
        Ok(pair)
    }

    /// End the session. The server call is best effort; local state is
    /// always cleared.
    pub async fn logout(&self) {
        if let Err(e) = self.client.send(ApiRequest::post(self.logout_endpoint.as_str())).await {
            tracing::debug!(err = %e, "logout call failed");
        }
        self.store.clear();
        tracing::info!("logged out");
        let _ = self.events.send(SessionEvent::LoggedOut);
    }

    pub fn current_email(&self) -> Option<String> {
        self.store.get(USER_EMAIL)
    }

    pub fn is_logged_in(&self) -> bool {
        storage::authorization_value(&*self.store).is_some()
    }
}
