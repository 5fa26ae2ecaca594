use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use typed_builder::TypedBuilder;

use crate::{
    encoders::{AuthParamsMaker, DispatchAuthParams},
    error::{BoxError, Error, Result},
    expiry::{ExpiryPolicy, StrictExpiry},
    params::RequestParams,
    plugin::{RequestContext, RequestPlugin},
    record::CredentialRecord,
    refresh::{ProviderStrategy, RefreshCredentials, RefreshTokenGrant, StrategyRegistry},
    store::{CreateOutcome, Identity, IdentityQuery, IdentityRelation, IdentityStore},
};

/// Name under which [`CredentialAttacher`] registers as a [`RequestPlugin`].
pub const PLUGIN_NAME: &str = "attach-credentials";

/// Produces the first credentials of a subject that has none for the provider yet.
#[async_trait]
pub trait InitCredentials: Send + Sync + fmt::Debug {
    async fn init(&self, subject_id: &str) -> std::result::Result<CredentialRecord, BoxError>;
}

/// Options of a [`CredentialAttacher`].
///
/// Only `provider_name` and `store` are required:
/// * `strategies`: Provider strategies used to refresh expired credentials. Empty by default.
/// * `remove_subject_prop`: Remove the subject from the params handed downstream. Default is `true`.
/// * `subject_prop_name`: Params key holding the subject. Default is `"user"`.
/// * `credentials_method_name`: Lookup method passed to the store. Default is `"getCredentialsForProvider"`.
/// * `relation`: Relation holding the credentials. Derived from the provider name by default.
/// * `init_credentials`: Hook creating credentials for subjects without any. None by default.
/// * `init_wait_attempts`: Reads of the store while waiting for a concurrent initialization. Default is `10`.
/// * `init_wait_interval`: Delay before each of these reads. Default is 100ms.
/// * `are_credentials_expired`: Default is [`StrictExpiry`].
/// * `refresh_credentials`: Default is [`RefreshTokenGrant`].
/// * `make_auth_params`: Default is [`DispatchAuthParams`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct AttachCredentialsOptions {
    #[builder(setter(into))]
    provider_name: String,
    store: Arc<dyn IdentityStore>,
    #[builder(default)]
    strategies: StrategyRegistry,
    #[builder(default = true)]
    remove_subject_prop: bool,
    #[builder(default = "user".to_string(), setter(into))]
    subject_prop_name: String,
    #[builder(default = "getCredentialsForProvider".to_string(), setter(into))]
    credentials_method_name: String,
    #[builder(default, setter(strip_option))]
    relation: Option<IdentityRelation>,
    #[builder(default, setter(strip_option))]
    init_credentials: Option<Arc<dyn InitCredentials>>,
    #[builder(default = 10)]
    init_wait_attempts: u32,
    #[builder(default = Duration::from_millis(100))]
    init_wait_interval: Duration,
    #[builder(default = Arc::new(StrictExpiry) as Arc<dyn ExpiryPolicy>)]
    are_credentials_expired: Arc<dyn ExpiryPolicy>,
    #[builder(default = Arc::new(RefreshTokenGrant) as Arc<dyn RefreshCredentials>)]
    refresh_credentials: Arc<dyn RefreshCredentials>,
    #[builder(default = Arc::new(DispatchAuthParams) as Arc<dyn AuthParamsMaker>)]
    make_auth_params: Arc<dyn AuthParamsMaker>,
}

/// Attaches a subject's stored credentials to request params.
///
/// For params carrying a subject (under `user` by default), the subject's
/// credentials for the configured provider are loaded from the identity store,
/// initialized if the subject has none yet, refreshed and persisted if expired,
/// and finally merged into the params. Params without a subject pass through
/// unchanged.
///
/// Uses `Arc` internally for cheap cloning.
#[derive(Debug, Clone)]
pub struct CredentialAttacher {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    provider_name: String,
    store: Arc<dyn IdentityStore>,
    strategy: Option<Arc<dyn ProviderStrategy>>,
    remove_subject_prop: bool,
    subject_prop_name: String,
    credentials_method_name: String,
    relation: IdentityRelation,
    init_credentials: Option<Arc<dyn InitCredentials>>,
    init_wait_attempts: u32,
    init_wait_interval: Duration,
    are_credentials_expired: Arc<dyn ExpiryPolicy>,
    refresh_credentials: Arc<dyn RefreshCredentials>,
    make_auth_params: Arc<dyn AuthParamsMaker>,
}

impl CredentialAttacher {
    /// Create a new [`CredentialAttacher`].
    ///
    /// The refresh strategy of the provider is looked up once, here. If none is
    /// registered, attaching still works until credentials expire, which then
    /// fails with `ProviderNotRegistered`.
    ///
    /// # Errors
    /// Fails with `InvalidOptions` if `provider_name` or `subject_prop_name` is empty.
    pub fn new(options: AttachCredentialsOptions) -> Result<Self> {
        if options.provider_name.is_empty() {
            return Err(Error::InvalidOptions(
                "providerName must be a non-empty string".to_string(),
            ));
        }
        if options.subject_prop_name.is_empty() {
            return Err(Error::InvalidOptions(
                "subjectPropName must be a non-empty string".to_string(),
            ));
        }

        let strategy = options.strategies.lookup(&options.provider_name).ok();
        if strategy.is_none() {
            tracing::debug!(
                "No refresh strategy registered for provider `{}`. Expired credentials cannot be refreshed.",
                options.provider_name
            );
        }
        let relation = options
            .relation
            .unwrap_or_else(|| IdentityRelation::for_provider(&options.provider_name));

        Ok(Self {
            inner: Arc::new(Inner {
                provider_name: options.provider_name,
                store: options.store,
                strategy,
                remove_subject_prop: options.remove_subject_prop,
                subject_prop_name: options.subject_prop_name,
                credentials_method_name: options.credentials_method_name,
                relation,
                init_credentials: options.init_credentials,
                init_wait_attempts: options.init_wait_attempts,
                init_wait_interval: options.init_wait_interval,
                are_credentials_expired: options.are_credentials_expired,
                refresh_credentials: options.refresh_credentials,
                make_auth_params: options.make_auth_params,
            }),
        })
    }

    #[must_use]
    pub fn provider_name(&self) -> &str {
        &self.inner.provider_name
    }

    /// Attach the credentials of the subject in `params`.
    ///
    /// Returns `params` unchanged if they carry no subject, or a falsy one
    /// (`null`, `false`, `0` or `""`).
    ///
    /// # Errors
    /// Fails if credentials cannot be loaded, initialized, refreshed, persisted or
    /// encoded. Params are never returned with partially applied credentials.
    #[tracing::instrument(skip_all, fields(provider = %self.inner.provider_name))]
    pub async fn attach(&self, params: RequestParams) -> Result<RequestParams> {
        let subject_prop = self.inner.subject_prop_name.as_str();
        let subject_id = match params.get(subject_prop).filter(|s| !is_falsy(s)) {
            None => {
                tracing::debug!("No `{subject_prop}` found in request params, skipping");
                return Ok(params);
            }
            Some(subject) => subject_id(subject)?,
        };

        let mut req_params = params;
        if self.inner.remove_subject_prop {
            req_params.remove(subject_prop);
        }

        let record = self.resolve(&subject_id).await?;
        let auth_params = self
            .inner
            .make_auth_params
            .make_auth_params(&req_params, &record)?;
        req_params.merge(auth_params);
        Ok(req_params)
    }

    /// Load, initialize or refresh the credentials of `subject_id`.
    async fn resolve(&self, subject_id: &str) -> Result<CredentialRecord> {
        let inner = &self.inner;
        let mut identities = self.load(subject_id).await?;

        if identities.len() > 1 {
            return Err(Error::AmbiguousIdentity {
                subject_id: subject_id.to_string(),
                provider: inner.provider_name.clone(),
                count: identities.len(),
            });
        }

        match (identities.pop(), &inner.init_credentials) {
            (Some(identity), _) => self.use_stored(subject_id, identity).await,
            (None, Some(init)) => self.initialize(subject_id, &**init).await,
            (None, None) => Err(Error::IdentityNotFound {
                subject_id: subject_id.to_string(),
                provider: inner.provider_name.clone(),
            }),
        }
    }

    async fn load(&self, subject_id: &str) -> Result<Vec<Identity>> {
        let inner = &self.inner;
        let query = IdentityQuery {
            subject_id,
            provider: &inner.provider_name,
            relation: inner.relation,
            method: &inner.credentials_method_name,
        };

        inner.store.query_records(&query).await.map_err(|source| {
            tracing::debug!("Error while loading identities for user `{subject_id}`: {source}");
            Error::IdentityQueryFailed {
                subject_id: subject_id.to_string(),
                source,
            }
        })
    }

    /// Create a placeholder identity first. Only the caller that created it runs
    /// the init hook and fills it; all others wait for the credentials to appear.
    async fn initialize(
        &self,
        subject_id: &str,
        init: &dyn InitCredentials,
    ) -> Result<CredentialRecord> {
        let inner = &self.inner;
        tracing::debug!(
            "Initializing credentials for user `{subject_id}` and provider `{}`",
            inner.provider_name
        );

        let outcome = inner
            .store
            .create_record(subject_id, &inner.provider_name, CredentialRecord::default())
            .await
            .map_err(Error::persistence)?;

        let identity = match outcome {
            CreateOutcome::Created(identity) => identity,
            CreateOutcome::Existing(identity) if identity.record.has_credentials() => {
                tracing::debug!("Credentials for user `{subject_id}` were initialized concurrently");
                return Ok(with_subject(identity.record, subject_id));
            }
            CreateOutcome::Existing(_) => return self.await_initialized(subject_id).await,
        };

        let record = init
            .init(subject_id)
            .await
            .map_err(|source| Error::InitializationFailed {
                subject_id: subject_id.to_string(),
                source,
            })?;
        if !record.has_credentials() {
            return Err(self.credentials_not_found(subject_id));
        }
        let record = with_subject(record, subject_id);

        inner
            .store
            .update_record_payload(&identity.id, &record)
            .await
            .map_err(Error::persistence)?;
        tracing::debug!("Stored initial credentials in identity `{}`", identity.id);

        Ok(record)
    }

    /// Use the credentials of an existing identity, refreshing them if expired.
    async fn use_stored(&self, subject_id: &str, identity: Identity) -> Result<CredentialRecord> {
        let inner = &self.inner;
        if !identity.record.has_credentials() {
            if inner.init_credentials.is_some() {
                return self.await_initialized(subject_id).await;
            }
            tracing::debug!(
                "No credentials found for user `{subject_id}` and provider `{}`",
                inner.provider_name
            );
            return Err(self.credentials_not_found(subject_id));
        }

        let record = with_subject(identity.record, subject_id);
        if !inner.are_credentials_expired.is_expired(&record) {
            return Ok(record);
        }
        tracing::debug!(
            "Credentials for user `{subject_id}` and provider `{}` are expired",
            inner.provider_name
        );

        let strategy = inner
            .strategy
            .clone()
            .ok_or_else(|| Error::ProviderNotRegistered(inner.provider_name.clone()))?;
        let fresh = inner
            .refresh_credentials
            .refresh(&*strategy, &record)
            .await?;
        let fresh = with_subject(fresh, subject_id);

        if let Err(source) = inner.store.update_record_payload(&identity.id, &fresh).await {
            tracing::error!(
                "Failed to store refreshed credentials in identity `{}` for user `{subject_id}`: {source}",
                identity.id
            );
            return Err(Error::PersistenceFailed {
                source,
                unsaved: Some(Box::new(fresh)),
            });
        }
        tracing::debug!("Updated identity `{}` with refreshed credentials", identity.id);

        Ok(fresh)
    }

    /// Re-read the identity until the initializing caller has stored its
    /// credentials. A placeholder left behind by a failed init hook is never
    /// initialized again and ends in `CredentialsNotFound`.
    async fn await_initialized(&self, subject_id: &str) -> Result<CredentialRecord> {
        let inner = &self.inner;
        for attempt in 1..=inner.init_wait_attempts {
            tokio::time::sleep(inner.init_wait_interval).await;
            let identities = self.load(subject_id).await?;
            if let [identity] = identities.as_slice() {
                if identity.record.has_credentials() {
                    tracing::debug!(
                        "Credentials for user `{subject_id}` were initialized concurrently (attempt {attempt})"
                    );
                    return Ok(with_subject(identity.record.clone(), subject_id));
                }
            }
        }

        tracing::debug!(
            "Credentials for user `{subject_id}` and provider `{}` did not appear after {} attempts",
            inner.provider_name,
            inner.init_wait_attempts
        );
        Err(self.credentials_not_found(subject_id))
    }

    fn credentials_not_found(&self, subject_id: &str) -> Error {
        Error::CredentialsNotFound {
            subject_id: subject_id.to_string(),
            provider: self.inner.provider_name.clone(),
        }
    }
}

#[async_trait]
impl RequestPlugin for CredentialAttacher {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    async fn process(
        &self,
        context: &RequestContext,
        params: RequestParams,
    ) -> Result<RequestParams> {
        tracing::trace!(
            "Attaching credentials to {} {}",
            context.method.as_ref().map_or("-", http::Method::as_str),
            context.url.as_ref().map_or("-", url::Url::as_str)
        );
        self.attach(params).await
    }
}

fn is_falsy(subject: &Value) -> bool {
    match subject {
        Value::Null | Value::Bool(false) => true,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|n| n.abs() < f64::EPSILON),
        _ => false,
    }
}

/// Identifier of a subject: its `id` field, or the subject itself if it is a
/// plain string or number.
fn subject_id(subject: &Value) -> Result<String> {
    let id = match subject {
        Value::Object(fields) => fields.get("id").unwrap_or(&Value::Null),
        other => other,
    };

    match id {
        Value::String(id) if !id.is_empty() => Ok(id.clone()),
        Value::Number(id) => Ok(id.to_string()),
        _ => Err(Error::InvalidSubject(
            "subject must have a non-empty `id`".to_string(),
        )),
    }
}

fn with_subject(mut record: CredentialRecord, subject_id: &str) -> CredentialRecord {
    if record.subject_id.is_none() {
        record.subject_id = Some(subject_id.to_string());
    }
    record
}
