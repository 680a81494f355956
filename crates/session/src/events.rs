// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// Session lifecycle events published on the console's broadcast channel.
///
/// The embedding application listens for [`SessionEvent::Expired`] and
/// navigates to `login_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    LoggedIn { email: String },
    /// A new token pair was stored after a 401.
    Refreshed,
    /// Refresh failed; storage was cleared.
    Expired { login_path: String },
    LoggedOut,
}
