// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated client for one backend.

use std::sync::Arc;

use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::coordinator::{Intercept, RefreshCoordinator};
use crate::error::ApiError;
use crate::storage::{self, SessionStore};
use crate::transport::{ApiRequest, ApiResponse, Transport};

/// Issues requests against one backend, attaching the stored access token and
/// recovering once from an expired token through its coordinator.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    coordinator: Arc<RefreshCoordinator>,
    store: Arc<dyn SessionStore>,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        coordinator: Arc<RefreshCoordinator>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self { transport, coordinator, store }
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Request hook: stamp the stored token on every outgoing request.
    fn apply_auth(&self, request: &mut ApiRequest) {
        match storage::authorization_value(&*self.store) {
            Some(value) => request.authorize(&value),
            // Logged out: no header at all, neither a default a refresh
            // installed nor one already on the request.
            None => {
                request.headers.remove(AUTHORIZATION);
                self.transport.set_authorization(None);
            }
        }
    }

    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse, ApiError> {
        loop {
            self.apply_auth(&mut request);
            let err = match self.transport.send(&request).await {
                Ok(resp) => return Ok(resp),
                Err(err) => err,
            };
            match self.coordinator.intercept(err, &mut request).await {
                // Terminates: the coordinator only retries unmarked requests.
                Intercept::Retry => {
                    tracing::debug!(request_id = %request.id(), path = %request.path, "replaying request");
                }
                Intercept::Reject(e) => return Err(e),
            }
        }
    }

    /// Send and deserialize the response payload.
    pub async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        self.send(request).await?.json()
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<ApiResponse, ApiError> {
        self.send(ApiRequest::post(path).json(body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<ApiResponse, ApiError> {
        self.send(ApiRequest::put(path).json(body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> Result<ApiResponse, ApiError> {
        self.send(ApiRequest::patch(path).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.send(ApiRequest::delete(path)).await
    }
}
