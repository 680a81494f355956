// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Upstream services the proxy forwards to.

pub mod client;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// One of the console's backend services, addressed by the first path
/// segment after `/api/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Auth,
    Crm,
    Transcripts,
}

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::Auth, Backend::Crm, Backend::Transcripts];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Crm => "crm",
            Self::Transcripts => "transcripts",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|b| b.as_str() == s).ok_or_else(|| format!("unknown backend: {s}"))
    }
}

#[cfg(test)]
#[path = "upstream_tests.rs"]
mod tests;
