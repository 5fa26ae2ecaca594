use serde::Deserialize;
use serde_json::json;

use super::patch;
use crate::params::RequestParams;

/// A cookie string appended to the `cookie` header.
#[derive(Clone, PartialEq, Deserialize, veil::Redact)]
#[serde(rename_all = "camelCase")]
pub struct CookiePayload {
    #[redact]
    pub cookie: String,
    #[serde(default)]
    pub auth_type: Option<String>,
}

impl CookiePayload {
    #[must_use]
    pub fn encode(&self, base: &RequestParams) -> RequestParams {
        let cookie = match base.header("cookie") {
            Some(existing) if !existing.is_empty() => format!("{existing};{}", self.cookie),
            _ => self.cookie.clone(),
        };

        base.merged(patch(json!({
            "authType": self.auth_type.as_deref().unwrap_or("cookie"),
            "headers": { "cookie": cookie }
        })))
    }
}
