// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated HTTP clients for the CRM console backends.
//!
//! Each backend (auth, CRM, transcripts) gets its own [`client::ApiClient`]
//! bound to one [`coordinator::RefreshCoordinator`]. All clients share a
//! single [`storage::SessionStore`] holding the access/refresh token pair
//! and one [`coordinator::RefreshGate`], so a session is refreshed at most
//! once at a time across backends.
//! When a request comes back 401 the coordinator runs a single refresh call,
//! parks concurrent callers behind it and replays them with the new token.

pub mod auth;
pub mod client;
pub mod console;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod storage;
pub mod transport;

pub use client::ApiClient;
pub use console::{Console, ConsoleConfig};
pub use coordinator::{Intercept, RefreshCoordinator, RefreshGate};
pub use error::ApiError;
pub use events::SessionEvent;
pub use storage::{FileStore, MemoryStore, SessionStore, TokenPair};
pub use transport::{ApiRequest, ApiResponse, ClientConfig, HttpTransport, Transport};
