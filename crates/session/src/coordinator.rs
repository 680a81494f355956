// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight access token refresh.
//!
//! When a request fails with 401 for the first time, the coordinator either
//! starts the one refresh call or parks the caller behind the call already in
//! flight. Every parked caller is settled exactly once when that call
//! resolves, after which the flag drops back to idle and the queue is empty.
//!
//! ```text
//! Idle --401, unmarked--> Refreshing --ok--> drain(resolve) --> Idle
//!                              |
//!                              +--err--> clear store + drain(reject) + Expired --> Idle
//! ```
//!
//! A refresh failure (including a missing refresh token) clears the session
//! store and publishes [`SessionEvent::Expired`] once.
//!
//! Coordinators over the same session store must share one [`RefreshGate`]:
//! the refresh token rotates, so two refresh calls for one session would have
//! the second one rejected.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::{broadcast, oneshot};

use crate::error::{conflict_message, ApiError};
use crate::events::SessionEvent;
use crate::storage::{self, SessionStore, TokenPair, REFRESH_TOKEN};
use crate::transport::{ApiRequest, Transport, TransportError};

/// What the client should do with a failed request.
#[derive(Debug, Clone, PartialEq)]
pub enum Intercept {
    /// The request now carries a fresh token; send it again.
    Retry,
    Reject(ApiError),
}

/// Exchanges a refresh token for a new token pair.
pub trait Refresher: Send + Sync {
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, Result<TokenPair, ApiError>>;
}

/// Refresher that posts `{"refresh_token": ...}` to the auth backend.
///
/// The transport must not have a coordinator of its own behind it.
pub struct HttpRefresher {
    transport: Arc<dyn Transport>,
    path: String,
}

impl HttpRefresher {
    pub fn new(transport: Arc<dyn Transport>, path: impl Into<String>) -> Self {
        Self { transport, path: path.into() }
    }
}

impl Refresher for HttpRefresher {
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, Result<TokenPair, ApiError>> {
        Box::pin(async move {
            let request =
                ApiRequest::post(self.path.as_str()).json(json!({ "refresh_token": refresh_token }));
            let resp = self.transport.send(&request).await?;
            resp.json()
        })
    }
}

/// Snapshot of the coordinator's mutable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorState {
    pub refreshing: bool,
    pub waiters: usize,
}

type Waiter = oneshot::Sender<Result<String, ApiError>>;

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    waiters: Vec<Waiter>,
}

/// In-flight flag, waiter queue and attempt counter for one session.
#[derive(Default)]
pub struct RefreshGate {
    state: Mutex<RefreshState>,
    attempts: AtomicU64,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }
}

/// How a 401 is handled once the gate is consulted.
enum Turn {
    Lead,
    Wait(oneshot::Receiver<Result<String, ApiError>>),
    /// The session changed after the request went out.
    Superseded(Option<String>),
}

pub struct RefreshCoordinator {
    store: Arc<dyn SessionStore>,
    refresher: Arc<dyn Refresher>,
    transport: Arc<dyn Transport>,
    events: broadcast::Sender<SessionEvent>,
    login_path: String,
    gate: Arc<RefreshGate>,
}

impl RefreshCoordinator {
    /// `transport` is the client whose default `Authorization` header follows
    /// the refreshed token.
    pub fn new(
        store: Arc<dyn SessionStore>,
        refresher: Arc<dyn Refresher>,
        transport: Arc<dyn Transport>,
        events: broadcast::Sender<SessionEvent>,
        login_path: impl Into<String>,
    ) -> Self {
        Self {
            store,
            refresher,
            transport,
            events,
            login_path: login_path.into(),
            gate: Arc::new(RefreshGate::new()),
        }
    }

    /// Share `gate` with the other coordinators of the same session.
    pub fn with_gate(mut self, gate: Arc<RefreshGate>) -> Self {
        self.gate = gate;
        self
    }

    /// Number of refresh calls issued so far through this coordinator's gate.
    pub fn attempts(&self) -> u64 {
        self.gate.attempts.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> CoordinatorState {
        let state = self.gate.state.lock();
        CoordinatorState { refreshing: state.refreshing, waiters: state.waiters.len() }
    }

    /// Decide the fate of a failed request.
    pub async fn intercept(&self, error: TransportError, request: &mut ApiRequest) -> Intercept {
        if request.is_cancelled() {
            return Intercept::Reject(ApiError::Cancelled);
        }
        match error {
            TransportError::Cancelled { .. } => Intercept::Reject(ApiError::Cancelled),
            TransportError::Network { message, .. } => {
                Intercept::Reject(ApiError::Network { message })
            }
            TransportError::Http { status: 409, body, .. } => {
                Intercept::Reject(ApiError::Conflict { message: conflict_message(&body) })
            }
            TransportError::Http { status: 401, .. } if !request.is_retried() => {
                request.mark_retried();
                self.recover(request).await
            }
            TransportError::Http { status, body, .. } => {
                Intercept::Reject(ApiError::Status { status, body })
            }
        }
    }

    async fn recover(&self, request: &mut ApiRequest) -> Intercept {
        loop {
            let turn = {
                let mut state = self.gate.state.lock();
                if state.refreshing {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push(tx);
                    Turn::Wait(rx)
                } else if let Some(current) = self.superseded(request) {
                    Turn::Superseded(current)
                } else {
                    state.refreshing = true;
                    Turn::Lead
                }
            };

            let outcome = match turn {
                Turn::Lead => self.lead().await,
                Turn::Superseded(Some(value)) => {
                    tracing::debug!(request_id = %request.id(), "token rotated since request was sent");
                    request.authorize(&value);
                    return Intercept::Retry;
                }
                Turn::Superseded(None) => {
                    return Intercept::Reject(ApiError::SessionExpired {
                        status: Some(401),
                        message: "session ended while the request was in flight".to_owned(),
                    });
                }
                Turn::Wait(rx) => {
                    tracing::debug!(request_id = %request.id(), "waiting on in-flight refresh");
                    let settled = match request.cancel.clone() {
                        Some(cancel) => tokio::select! {
                            _ = cancel.cancelled() => return Intercept::Reject(ApiError::Cancelled),
                            settled = rx => settled,
                        },
                        None => rx.await,
                    };
                    match settled {
                        Ok(outcome) => outcome,
                        // Leader was dropped mid-refresh; compete again.
                        Err(_) => continue,
                    }
                }
            };

            return match outcome {
                Ok(access_token) => {
                    request.authorize(&storage::authorization_for(&*self.store, &access_token));
                    Intercept::Retry
                }
                Err(e) => Intercept::Reject(e),
            };
        }
    }

    /// `Some(current)` when the stored credentials no longer match the ones
    /// the request was sent with: rotated (`Some`) or torn down (`None`).
    fn superseded(&self, request: &ApiRequest) -> Option<Option<String>> {
        let sent = request.authorization()?;
        let current = storage::authorization_value(&*self.store);
        (current.as_deref() != Some(sent)).then_some(current)
    }

    /// Run the refresh call and settle every waiter queued behind it.
    async fn lead(&self) -> Result<String, ApiError> {
        let mut guard = LeaderGuard { state: &self.gate.state, armed: true };
        let result = self.refresh().await;

        // Cleared before the flag drops: no later 401 may lead with the
        // refresh token that just failed.
        if result.is_err() {
            self.clear_session();
        }
        let waiters = {
            let mut state = self.gate.state.lock();
            state.refreshing = false;
            std::mem::take(&mut state.waiters)
        };
        guard.armed = false;

        tracing::debug!(waiters = waiters.len(), ok = result.is_ok(), "draining refresh waiters");
        match result {
            Ok(access_token) => {
                for waiter in waiters {
                    let _ = waiter.send(Ok(access_token.clone()));
                }
                Ok(access_token)
            }
            Err(err) => {
                for waiter in waiters {
                    let _ = waiter.send(Err(err.clone()));
                }
                tracing::warn!(login_path = %self.login_path, "session expired");
                let _ = self.events.send(SessionEvent::Expired { login_path: self.login_path.clone() });
                Err(err)
            }
        }
    }

    async fn refresh(&self) -> Result<String, ApiError> {
        let Some(refresh_token) = storage::usable(self.store.get(REFRESH_TOKEN)) else {
            tracing::warn!("no usable refresh token");
            return Err(ApiError::SessionExpired {
                status: None,
                message: "no refresh token available".to_owned(),
            });
        };

        self.gate.attempts.fetch_add(1, Ordering::Relaxed);
        match self.refresher.refresh(&refresh_token).await {
            Ok(pair) => {
                storage::store_tokens(&*self.store, &pair);
                let value = storage::authorization_for(&*self.store, &pair.access_token);
                self.transport.set_authorization(Some(&value));
                let _ = self.events.send(SessionEvent::Refreshed);
                tracing::info!("access token refreshed");
                Ok(pair.access_token)
            }
            Err(e) => {
                tracing::warn!(err = %e, "token refresh failed");
                Err(ApiError::SessionExpired { status: e.status(), message: e.to_string() })
            }
        }
    }

    fn clear_session(&self) {
        self.store.clear();
        self.transport.set_authorization(None);
    }
}

/// Resets the flag if the leading future is dropped before the refresh call
/// settles. Dropping the queued senders wakes the waiters, which then retry.
struct LeaderGuard<'a> {
    state: &'a Mutex<RefreshState>,
    armed: bool,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.state.lock();
            state.refreshing = false;
            state.waiters.clear();
        }
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
