use serde::Deserialize;
use serde_json::json;

use super::patch;
use crate::params::RequestParams;

/// Username and password, sent as HTTP basic auth.
#[derive(Clone, PartialEq, Deserialize, veil::Redact)]
#[serde(rename_all = "camelCase")]
pub struct BasicPayload {
    pub username: String,
    #[redact]
    pub password: String,
    #[serde(default)]
    pub send_immediately: Option<bool>,
    #[serde(default)]
    pub auth_type: Option<String>,
}

impl BasicPayload {
    #[must_use]
    pub fn encode(&self, base: &RequestParams) -> RequestParams {
        base.merged(patch(json!({
            "authType": self.auth_type.as_deref().unwrap_or("basic"),
            "auth": {
                "username": self.username,
                "password": self.password,
                "sendImmediately": self.send_immediately.unwrap_or(true),
            }
        })))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_basic_defines_username_and_password() {
        let payload: BasicPayload = serde_json::from_value(json!({
            "authType": "foo-type",
            "username": "foo",
            "password": "bar",
            "sendImmediately": false
        }))
        .unwrap();

        let params = payload.encode(&RequestParams::new());
        assert_eq!(
            params.get("auth"),
            Some(&json!({ "username": "foo", "password": "bar", "sendImmediately": false }))
        );
        assert_eq!(params.auth_type(), Some("foo-type"));
    }

    #[test]
    fn test_basic_defaults() {
        let payload: BasicPayload =
            serde_json::from_value(json!({ "username": "foo", "password": "bar" })).unwrap();

        let params = payload.encode(&RequestParams::new());
        assert_eq!(
            params.get("auth"),
            Some(&json!({ "username": "foo", "password": "bar", "sendImmediately": true }))
        );
        assert_eq!(params.auth_type(), Some("basic"));
    }

    #[test]
    fn test_basic_debug_hides_password() {
        let payload: BasicPayload =
            serde_json::from_value(json!({ "username": "foo", "password": "hunter2" })).unwrap();
        assert!(!format!("{payload:?}").contains("hunter2"));
    }
}
