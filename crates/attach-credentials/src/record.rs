use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type tag and payload of stored credentials, as consumed by
/// [`apply_credentials`](crate::apply_credentials).
#[derive(Clone, PartialEq, Serialize, Deserialize, veil::Redact)]
pub struct Credentials {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[redact]
    pub payload: Option<Value>,
}

impl Credentials {
    #[must_use]
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload: Some(payload),
        }
    }
}

/// Credentials stored in an identity store for a (subject, provider) pair.
///
/// Apart from `expires_at` and `subject_id`, the record is opaque to the
/// attach pipeline. `credentials` is handed to the auth params maker; the OAuth2
/// fields are only read by refresh strategies.
///
/// A record without `credentials` is a placeholder, created while credentials
/// for a subject are being initialized.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize, veil::Redact)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[redact]
    pub refresh_token: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub issued_on: Option<DateTime<Utc>>,
    /// Lifetime of the access token in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl CredentialRecord {
    /// A record carrying the given credentials and nothing else.
    #[must_use]
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    #[must_use]
    pub fn refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Whether the record carries credentials, as opposed to being a placeholder.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.credentials
            .as_ref()
            .is_some_and(|c| c.payload.as_ref().is_some_and(|p| !p.is_null()))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_record_wire_format() {
        let record: CredentialRecord = serde_json::from_value(json!({
            "subjectId": "user-1",
            "expiresAt": 1_700_000_000_000_i64,
            "credentials": { "type": "bearer", "payload": { "token": "abc" } },
            "refreshToken": "refresh",
            "tokenType": "Bearer"
        }))
        .unwrap();

        assert_eq!(record.subject_id.as_deref(), Some("user-1"));
        assert_eq!(
            record.expires_at,
            DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000)
        );
        assert_eq!(record.credentials.as_ref().unwrap().kind, "bearer");
        assert!(record.has_credentials());

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["refreshToken"], json!("refresh"));
        assert!(value.get("issuedOn").is_none());
    }

    #[test]
    fn test_placeholder_has_no_credentials() {
        assert!(!CredentialRecord::default().has_credentials());
        let record = CredentialRecord::with_credentials(Credentials {
            kind: "basic".to_string(),
            payload: Some(Value::Null),
        });
        assert!(!record.has_credentials());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let record = CredentialRecord::with_credentials(Credentials::new(
            "bearer",
            json!({ "token": "super-secret-token" }),
        ))
        .refresh_token("super-secret-refresh");
        let debug = format!("{record:?}");
        assert!(!debug.contains("super-secret-token"));
        assert!(!debug.contains("super-secret-refresh"));
    }
}
