mod basic;
mod bearer;
mod cookie;
mod header;

pub use basic::*;
pub use bearer::*;
pub use cookie::*;
pub use header::*;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    error::{Error, Result},
    params::RequestParams,
    record::{CredentialRecord, Credentials},
};

/// Credential types known to [`apply_credentials`].
pub const SUPPORTED_CREDENTIAL_TYPES: [&str; 4] = ["basic", "bearer", "cookie", "header"];

/// Credentials payload, classified by type.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthPayload {
    Basic(BasicPayload),
    Bearer(BearerPayload),
    Cookie(CookiePayload),
    Header(HeaderPayload),
}

impl AuthPayload {
    /// Classify a payload by its type tag.
    ///
    /// # Errors
    /// - `MissingPayload` if `payload` is absent or `null`.
    /// - `UnsupportedCredentialType` if `kind` is not one of [`SUPPORTED_CREDENTIAL_TYPES`].
    /// - `InvalidPayload` if the payload does not have the fields required by `kind`.
    pub fn from_parts(kind: &str, payload: Option<&Value>) -> Result<Self> {
        let payload = match payload {
            Some(Value::Null) | None => return Err(Error::MissingPayload),
            Some(payload) => payload,
        };

        match kind {
            "basic" => parse(kind, payload).map(Self::Basic),
            "bearer" => parse(kind, payload).map(Self::Bearer),
            "cookie" => parse(kind, payload).map(Self::Cookie),
            "header" => parse(kind, payload).map(Self::Header),
            _ => Err(Error::UnsupportedCredentialType(kind.to_string())),
        }
    }

    /// Type tag of this payload.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Basic(_) => "basic",
            Self::Bearer(_) => "bearer",
            Self::Cookie(_) => "cookie",
            Self::Header(_) => "header",
        }
    }

    /// Merge the payload into a copy of `base`.
    #[must_use]
    pub fn encode(&self, base: &RequestParams) -> RequestParams {
        match self {
            Self::Basic(payload) => payload.encode(base),
            Self::Bearer(payload) => payload.encode(base),
            Self::Cookie(payload) => payload.encode(base),
            Self::Header(payload) => payload.encode(base),
        }
    }
}

/// Attach `credentials` to a copy of `base`.
///
/// If neither the encoder nor `base` set an `authType`, the credentials type is used.
///
/// # Errors
/// See [`AuthPayload::from_parts`].
pub fn apply_credentials(base: &RequestParams, credentials: &Credentials) -> Result<RequestParams> {
    let payload = AuthPayload::from_parts(&credentials.kind, credentials.payload.as_ref())?;
    let mut params = payload.encode(base);
    if !params.contains_key("authType") {
        params.insert("authType", credentials.kind.clone());
    }
    Ok(params)
}

/// Turns a credential record into the auth params merged into outgoing requests.
pub trait AuthParamsMaker: Send + Sync + std::fmt::Debug {
    /// Auth params for `record`, to be deep-merged into `params`.
    ///
    /// # Errors
    /// Fails if the record's credentials cannot be encoded.
    fn make_auth_params(
        &self,
        params: &RequestParams,
        record: &CredentialRecord,
    ) -> Result<RequestParams>;
}

/// Default [`AuthParamsMaker`]: runs the record's credentials through [`apply_credentials`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchAuthParams;

impl AuthParamsMaker for DispatchAuthParams {
    fn make_auth_params(
        &self,
        params: &RequestParams,
        record: &CredentialRecord,
    ) -> Result<RequestParams> {
        let credentials = record.credentials.as_ref().ok_or(Error::MissingPayload)?;
        apply_credentials(params, credentials)
    }
}

fn parse<T: DeserializeOwned>(kind: &str, payload: &Value) -> Result<T> {
    T::deserialize(payload).map_err(|e| Error::InvalidPayload {
        kind: kind.to_string(),
        reason: e.to_string(),
    })
}

fn patch(value: Value) -> RequestParams {
    RequestParams::from_value(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn params(value: Value) -> RequestParams {
        RequestParams::from_value(value).unwrap()
    }

    #[test]
    fn test_unsupported_type_fails() {
        for kind in ["foo", "cookieJar", "", "Basic"] {
            let err = apply_credentials(&RequestParams::new(), &Credentials::new(kind, json!({})))
                .unwrap_err();
            assert!(matches!(err, Error::UnsupportedCredentialType(ref k) if k == kind));
            assert_eq!(
                err.to_string(),
                format!("credentials type {kind} is not supported")
            );
        }
    }

    #[test]
    fn test_missing_payload_fails_before_type_lookup() {
        let credentials = Credentials {
            kind: "foo".to_string(),
            payload: None,
        };
        let err = apply_credentials(&RequestParams::new(), &credentials).unwrap_err();
        assert!(matches!(err, Error::MissingPayload));
        assert_eq!(err.to_string(), "payload must not be undefined");

        let credentials = Credentials {
            kind: "bearer".to_string(),
            payload: Some(Value::Null),
        };
        assert!(matches!(
            apply_credentials(&RequestParams::new(), &credentials),
            Err(Error::MissingPayload)
        ));
    }

    #[test]
    fn test_invalid_payload_fails() {
        let err = apply_credentials(
            &RequestParams::new(),
            &Credentials::new("basic", json!({ "username": "foo" })),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidPayload { ref kind, .. } if kind == "basic"));

        assert!(matches!(
            AuthPayload::from_parts("cookie", Some(&json!("foo=bar"))),
            Err(Error::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_type_name_is_default_auth_type() {
        let result = apply_credentials(
            &RequestParams::new(),
            &Credentials::new("header", json!({ "value": "1234" })),
        )
        .unwrap();
        assert_eq!(result.auth_type(), Some("header"));
        assert_eq!(result.header("authorization"), Some("1234"));
    }

    #[test]
    fn test_encoder_default_wins_over_type_name() {
        let result = apply_credentials(
            &RequestParams::new(),
            &Credentials::new("bearer", json!({ "token": "bar" })),
        )
        .unwrap();
        assert_eq!(result.auth_type(), Some("oauth"));
    }

    #[test]
    fn test_existing_auth_type_is_not_overridden_by_type_name() {
        let base = params(json!({ "authType": "custom" }));
        let result =
            apply_credentials(&base, &Credentials::new("header", json!({ "value": "1" }))).unwrap();
        assert_eq!(result.auth_type(), Some("custom"));
    }

    #[test]
    fn test_unrelated_fields_are_preserved() {
        let base = params(json!({
            "uri": "https://api.example.com/items",
            "method": "POST",
            "json": { "name": "item" },
            "headers": { "accept": "application/json" }
        }));
        let cases = [
            Credentials::new("basic", json!({ "username": "foo", "password": "bar" })),
            Credentials::new("bearer", json!({ "token": "bar" })),
            Credentials::new("cookie", json!({ "cookie": "foo=bar" })),
            Credentials::new("header", json!({ "value": "1234", "name": "x-api-key" })),
        ];

        for credentials in &cases {
            let result = apply_credentials(&base, credentials).unwrap();
            for key in ["uri", "method", "json"] {
                assert_eq!(result.get(key), base.get(key), "{} changed {key}", credentials.kind);
            }
            assert_eq!(result.header("accept"), Some("application/json"));
        }
        assert_eq!(base.header("cookie"), None);
        assert!(!base.contains_key("auth"));
    }

    #[test]
    fn test_classify() {
        let payload = AuthPayload::from_parts("bearer", Some(&json!({ "token": "t" }))).unwrap();
        assert_eq!(payload, AuthPayload::Bearer(BearerPayload::new("t")));
        assert_eq!(payload.kind(), "bearer");
    }

    #[test]
    fn test_dispatch_auth_params() {
        let record = CredentialRecord::with_credentials(Credentials::new(
            "basic",
            json!({ "username": "foo", "password": "bar" }),
        ));
        let auth_params = DispatchAuthParams
            .make_auth_params(&params(json!({ "uri": "/items" })), &record)
            .unwrap();
        assert_eq!(
            auth_params.into_value(),
            json!({
                "uri": "/items",
                "authType": "basic",
                "auth": { "username": "foo", "password": "bar", "sendImmediately": true }
            })
        );

        assert!(matches!(
            DispatchAuthParams.make_auth_params(&RequestParams::new(), &CredentialRecord::default()),
            Err(Error::MissingPayload)
        ));
    }
}
