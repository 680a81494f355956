// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use crate::config::ProxyConfig;
use crate::upstream::client::UpstreamClient;
use crate::upstream::Backend;

/// Shared proxy state.
pub struct ProxyState {
    pub config: ProxyConfig,
    /// Clients for the configured upstreams; unconfigured backends are absent.
    pub upstreams: HashMap<Backend, UpstreamClient>,
}

impl ProxyState {
    pub fn new(config: ProxyConfig) -> anyhow::Result<Self> {
        let mut upstreams = HashMap::new();
        for backend in Backend::ALL {
            if let Some(url) = config.upstream(backend) {
                upstreams.insert(backend, UpstreamClient::new(url, config.timeout())?);
            }
        }
        Ok(Self { config, upstreams })
    }

    pub fn upstream(&self, backend: Backend) -> Option<&UpstreamClient> {
        self.upstreams.get(&backend)
    }
}
