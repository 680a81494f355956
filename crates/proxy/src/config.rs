// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use crate::upstream::Backend;

/// Configuration for the console API proxy.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "crm-proxy", about = "Reverse proxy for the CRM console backends")]
pub struct ProxyConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 3000)]
    pub port: u16,

    /// Base URL of the auth service.
    #[arg(long)]
    pub auth_upstream: Option<String>,

    /// Base URL of the CRM service.
    #[arg(long)]
    pub crm_upstream: Option<String>,

    /// Base URL of the transcripts service.
    #[arg(long)]
    pub transcripts_upstream: Option<String>,

    /// Upstream request timeout in milliseconds.
    #[arg(long, default_value_t = 30000)]
    pub timeout_ms: u64,

    /// Log filter (tracing `EnvFilter` syntax).
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log format: `text` or `json`.
    #[arg(long, default_value = "text")]
    pub log_format: String,
}

impl ProxyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn upstream(&self, backend: Backend) -> Option<&str> {
        let url = match backend {
            Backend::Auth => &self.auth_upstream,
            Backend::Crm => &self.crm_upstream,
            Backend::Transcripts => &self.transcripts_upstream,
        };
        url.as_deref().filter(|u| !u.is_empty())
    }
}
