//! Token verification settings.

use serde::{Deserialize, Serialize};

/// Settings for JWT verification at the gateway.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// HMAC secret for HS256 token verification. The gateway refuses to
    /// start with an empty secret unless `allow_anonymous` is set.
    pub jwt_secret: String,
    /// Accept connections without a token. Anonymous connections are
    /// tracked but never appear in the user index.
    pub allow_anonymous: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            allow_anonymous: false,
        }
    }
}
