use serde::Deserialize;
use serde_json::{Map, Value};

use crate::params::RequestParams;

const DEFAULT_HEADER_NAME: &str = "authorization";

/// An arbitrary header carrying the credentials, `authorization` unless named otherwise.
#[derive(Clone, PartialEq, Deserialize, veil::Redact)]
#[serde(rename_all = "camelCase")]
pub struct HeaderPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[redact]
    pub value: String,
    #[serde(default)]
    pub auth_type: Option<String>,
}

impl HeaderPayload {
    #[must_use]
    pub fn header_name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_HEADER_NAME)
    }

    #[must_use]
    pub fn encode(&self, base: &RequestParams) -> RequestParams {
        let mut headers = Map::new();
        headers.insert(
            self.header_name().to_ascii_lowercase(),
            Value::String(self.value.clone()),
        );

        let mut patch = RequestParams::new();
        patch.insert("headers", headers);
        if let Some(auth_type) = &self.auth_type {
            patch.insert("authType", auth_type.clone());
        }
        base.merged(patch)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_header_default_name_is_authorization() {
        let payload: HeaderPayload =
            serde_json::from_value(json!({ "authType": "foo", "value": "1234" })).unwrap();
        let params = payload.encode(&RequestParams::new());
        assert_eq!(params.header("authorization"), Some("1234"));
        assert_eq!(params.auth_type(), Some("foo"));
    }

    #[test]
    fn test_header_uses_name_from_payload() {
        let payload: HeaderPayload = serde_json::from_value(json!({
            "authType": "foo",
            "name": "my-authorization",
            "value": "1234"
        }))
        .unwrap();
        let params = payload.encode(&RequestParams::new());
        assert_eq!(params.header("my-authorization"), Some("1234"));
        assert_eq!(params.header("authorization"), None);
    }

    #[test]
    fn test_header_name_is_lowercased() {
        let base = RequestParams::from_value(json!({ "headers": { "authorization": "old" } })).unwrap();
        let payload: HeaderPayload =
            serde_json::from_value(json!({ "name": "Authorization", "value": "1234" })).unwrap();
        let params = payload.encode(&base);
        assert_eq!(params.headers().unwrap().len(), 1);
        assert_eq!(params.header("authorization"), Some("1234"));
    }

    #[test]
    fn test_header_has_no_builtin_auth_type() {
        let payload: HeaderPayload = serde_json::from_value(json!({ "value": "1234" })).unwrap();
        let params = payload.encode(&RequestParams::new());
        assert_eq!(params.auth_type(), None);
    }

    #[test]
    fn test_header_requires_value() {
        assert!(serde_json::from_value::<HeaderPayload>(json!({ "name": "x-api-key" })).is_err());
    }
}
