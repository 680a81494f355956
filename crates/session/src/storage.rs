// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session credential storage shared by every backend client.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub const ACCESS_TOKEN: &str = "access_token";
pub const REFRESH_TOKEN: &str = "refresh_token";
pub const TOKEN_TYPE: &str = "token_type";
pub const USER_EMAIL: &str = "user_email";

pub const DEFAULT_TOKEN_TYPE: &str = "bearer";

/// Token pair returned by login and refresh calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// Durable key/value storage for session credentials. Last write wins.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
    /// Drop every persisted key.
    fn clear(&self);
}

/// Whether a stored token value can be sent.
///
/// Values written by a broken login flow end up as the literal strings
/// `"undefined"` or `"null"`; those are treated as absent.
pub fn usable(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty() && v != "undefined" && v != "null")
}

/// Persist both halves of a token pair. The refresh token is rotated, never kept.
pub fn store_tokens(store: &dyn SessionStore, pair: &TokenPair) {
    store.set(ACCESS_TOKEN, &pair.access_token);
    store.set(REFRESH_TOKEN, &pair.refresh_token);
    if let Some(ref token_type) = pair.token_type {
        store.set(TOKEN_TYPE, token_type);
    }
}

pub fn token_type(store: &dyn SessionStore) -> String {
    usable(store.get(TOKEN_TYPE)).unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_owned())
}

/// Build the `Authorization` header value for an access token.
pub fn authorization_for(store: &dyn SessionStore, access_token: &str) -> String {
    format!("{} {}", token_type(store), access_token)
}

/// `Authorization` header value from the stored access token, if usable.
pub fn authorization_value(store: &dyn SessionStore) -> Option<String> {
    let token = usable(store.get(ACCESS_TOKEN))?;
    Some(authorization_for(store, &token))
}

/// In-process store. Contents do not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_owned(), value.to_owned());
    }

    fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Store backed by a JSON object on disk.
///
/// Every mutation rewrites the file atomically. A failed write is logged and
/// the in-memory view stays authoritative for this process.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`, loading existing contents if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let entries = if path.exists() { load(&path)? } else { BTreeMap::new() };
        Ok(Self { path, entries: Mutex::new(entries) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Swap in a full snapshot through a sibling temp file. Callers hold the
    /// entries lock, so only other processes can race on the path.
    fn write_file(&self, entries: &BTreeMap<String, String>) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let mut staged = self.path.clone().into_os_string();
        staged.push(format!(".{}.tmp", std::process::id()));
        std::fs::write(&staged, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&staged, &self.path)?;
        Ok(())
    }

    fn persist(&self, entries: &BTreeMap<String, String>) {
        if let Err(e) = self.write_file(entries) {
            tracing::warn!(path = %self.path.display(), err = %e, "failed to persist session store");
        }
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self.entries.lock();
        entries.insert(key.to_owned(), value.to_owned());
        self.persist(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.persist(&entries);
        }
    }

    fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        self.persist(&entries);
    }
}

fn load(path: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    let contents = std::fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
