use serde::Deserialize;
use serde_json::json;

use super::patch;
use crate::params::RequestParams;

/// A token attached with the `Bearer` auth-scheme.
/// Holds only the token, without the `Bearer` prefix.
#[derive(Clone, PartialEq, Deserialize, veil::Redact)]
#[serde(rename_all = "camelCase")]
pub struct BearerPayload {
    #[redact]
    pub token: String,
    #[serde(default)]
    pub send_immediately: Option<bool>,
    #[serde(default)]
    pub auth_type: Option<String>,
}

impl BearerPayload {
    /// Create a payload for the given token with default flags.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            send_immediately: None,
            auth_type: None,
        }
    }

    #[must_use]
    pub fn encode(&self, base: &RequestParams) -> RequestParams {
        base.merged(patch(json!({
            "authType": self.auth_type.as_deref().unwrap_or("oauth"),
            "auth": {
                "bearer": self.token,
                "sendImmediately": self.send_immediately.unwrap_or(true),
            }
        })))
    }
}
