//! Session — the authenticated token pair for a recording station.
//!
//! A session is either "last known good" or absent; there is no probabilistic
//! middle state. The recorder exposes no TTL, so validity is only ever
//! established empirically by a successful API call.

use serde::{Deserialize, Serialize};

/// Authenticated session issued by the recorder's login endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session id attached to every authenticated call.
    pub sid: String,
    /// Device token issued by two-factor logins; replayed on later logins
    /// so the account does not prompt for a one-time password again.
    #[serde(default)]
    pub device_token: Option<String>,
}

impl Session {
    /// Create a session from a login response.
    #[must_use]
    pub fn new(sid: impl Into<String>, device_token: Option<String>) -> Self {
        Self {
            sid: sid.into(),
            device_token,
        }
    }
}
