mod oauth;

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
pub use oauth::*;
use serde_json::json;

use crate::{
    error::{Error, Result},
    record::{CredentialRecord, Credentials},
};

/// Tokens issued by a provider in exchange for a refresh token.
#[derive(Clone, PartialEq, veil::Redact)]
pub struct TokenGrant {
    #[redact]
    pub access_token: String,
    #[redact]
    pub refresh_token: Option<String>,
    pub expires_in: Option<Duration>,
    pub issued_on: Option<DateTime<Utc>>,
    pub token_type: Option<String>,
}

impl TokenGrant {
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_in: None,
            issued_on: None,
            token_type: None,
        }
    }

    /// Build the record replacing `previous`.
    ///
    /// The access token becomes `bearer` credentials. `expires_at` is
    /// `issued_on + expires_in`; without `expires_in` the new record never expires.
    /// The previous refresh token is kept if the provider did not rotate it.
    #[must_use]
    pub fn into_record(self, previous: &CredentialRecord) -> CredentialRecord {
        let issued_on = self.issued_on.unwrap_or_else(Utc::now);
        let expires_in = self
            .expires_in
            .and_then(|d| i64::try_from(d.as_secs()).ok());
        let expires_at = expires_in
            .and_then(TimeDelta::try_seconds)
            .and_then(|d| issued_on.checked_add_signed(d));

        CredentialRecord {
            subject_id: previous.subject_id.clone(),
            expires_at,
            credentials: Some(Credentials::new(
                "bearer",
                json!({ "token": self.access_token }),
            )),
            refresh_token: self.refresh_token.or_else(|| previous.refresh_token.clone()),
            issued_on: Some(issued_on),
            expires_in,
            token_type: Some(self.token_type.unwrap_or_else(|| "Bearer".to_string())),
        }
    }
}

/// Per-provider handle able to exchange a refresh token at the provider's
/// token endpoint.
#[async_trait]
pub trait ProviderStrategy: Send + Sync + std::fmt::Debug {
    /// Exchange `refresh_token` for new tokens.
    ///
    /// # Errors
    /// Fails with `RefreshFailed` on transport or protocol errors.
    async fn refresh_token_grant(&self, refresh_token: &str) -> Result<TokenGrant>;
}

/// Procedure turning expired credentials into fresh ones using a provider strategy.
#[async_trait]
pub trait RefreshCredentials: Send + Sync + std::fmt::Debug {
    /// # Errors
    /// Fails with `RefreshFailed` if no fresh credentials could be obtained.
    async fn refresh(
        &self,
        strategy: &dyn ProviderStrategy,
        current: &CredentialRecord,
    ) -> Result<CredentialRecord>;
}

/// Default [`RefreshCredentials`]: a `refresh_token` grant.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshTokenGrant;

#[async_trait]
impl RefreshCredentials for RefreshTokenGrant {
    async fn refresh(
        &self,
        strategy: &dyn ProviderStrategy,
        current: &CredentialRecord,
    ) -> Result<CredentialRecord> {
        let refresh_token = current.refresh_token.as_deref().ok_or_else(|| {
            Error::RefreshFailed("Stored credentials do not contain a refresh token".to_string())
        })?;

        let grant = strategy.refresh_token_grant(refresh_token).await?;
        Ok(grant.into_record(current))
    }
}

/// Provider strategies by provider name.
#[derive(Debug, Clone, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn ProviderStrategy>>,
}

impl StrategyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `strategy` for `provider`, replacing any previous registration.
    #[must_use]
    pub fn register(mut self, provider: &str, strategy: impl ProviderStrategy + 'static) -> Self {
        self.insert(provider, Arc::new(strategy));
        self
    }

    pub fn insert(&mut self, provider: &str, strategy: Arc<dyn ProviderStrategy>) {
        self.strategies.insert(provider.to_string(), strategy);
    }

    #[must_use]
    pub fn contains(&self, provider: &str) -> bool {
        self.strategies.contains_key(provider)
    }

    /// # Errors
    /// Fails with `ProviderNotRegistered` if no strategy is registered for `provider`.
    pub fn lookup(&self, provider: &str) -> Result<Arc<dyn ProviderStrategy>> {
        self.strategies
            .get(provider)
            .cloned()
            .ok_or_else(|| Error::ProviderNotRegistered(provider.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Debug, Default)]
    struct RecordingStrategy {
        seen: Mutex<Vec<String>>,
        grant: Option<TokenGrant>,
    }

    #[async_trait]
    impl ProviderStrategy for RecordingStrategy {
        async fn refresh_token_grant(&self, refresh_token: &str) -> Result<TokenGrant> {
            self.seen.lock().unwrap().push(refresh_token.to_string());
            self.grant
                .clone()
                .ok_or_else(|| Error::RefreshFailed("invalid_grant".to_string()))
        }
    }

    fn issued_on() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_grant_into_record() {
        let previous = CredentialRecord {
            subject_id: Some("user-1".to_string()),
            refresh_token: Some("old-refresh".to_string()),
            ..CredentialRecord::default()
        };
        let grant = TokenGrant {
            refresh_token: Some("new-refresh".to_string()),
            expires_in: Some(Duration::from_secs(3600)),
            issued_on: Some(issued_on()),
            ..TokenGrant::new("new-access")
        };

        let record = grant.into_record(&previous);
        assert_eq!(record.subject_id.as_deref(), Some("user-1"));
        assert_eq!(record.refresh_token.as_deref(), Some("new-refresh"));
        assert_eq!(record.issued_on, Some(issued_on()));
        assert_eq!(record.expires_in, Some(3600));
        assert_eq!(
            record.expires_at,
            Some(issued_on() + TimeDelta::seconds(3600))
        );
        assert_eq!(record.token_type.as_deref(), Some("Bearer"));
        assert_eq!(
            record.credentials,
            Some(Credentials::new("bearer", json!({ "token": "new-access" })))
        );
    }

    #[test]
    fn test_grant_without_expiry_never_expires() {
        let previous = CredentialRecord::default().refresh_token("kept");
        let record = TokenGrant {
            token_type: Some("MAC".to_string()),
            ..TokenGrant::new("access")
        }
        .into_record(&previous);
        assert_eq!(record.expires_at, None);
        assert!(record.issued_on.is_some());
        assert_eq!(record.refresh_token.as_deref(), Some("kept"));
        assert_eq!(record.token_type.as_deref(), Some("MAC"));
    }

    #[tokio::test]
    async fn test_refresh_token_grant_uses_stored_refresh_token() {
        let strategy = RecordingStrategy {
            grant: Some(TokenGrant::new("fresh")),
            ..RecordingStrategy::default()
        };
        let current = CredentialRecord::default().refresh_token("stored-refresh");

        let record = RefreshTokenGrant.refresh(&strategy, &current).await.unwrap();
        assert_eq!(*strategy.seen.lock().unwrap(), vec!["stored-refresh".to_string()]);
        assert_eq!(
            record.credentials,
            Some(Credentials::new("bearer", json!({ "token": "fresh" })))
        );
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_fails() {
        let strategy = RecordingStrategy::default();
        let err = RefreshTokenGrant
            .refresh(&strategy, &CredentialRecord::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RefreshFailed(_)));
        assert!(strategy.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_registry_lookup() {
        let registry = StrategyRegistry::new().register("my-provider", RecordingStrategy::default());
        assert!(registry.contains("my-provider"));
        assert!(registry.lookup("my-provider").is_ok());

        let err = registry.lookup("other").unwrap_err();
        assert!(matches!(err, Error::ProviderNotRegistered(ref name) if name == "other"));
        assert_eq!(
            err.to_string(),
            "Auth provider with name \"other\" is not registered"
        );
    }
}
