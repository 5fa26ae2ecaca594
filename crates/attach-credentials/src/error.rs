use std::sync::Arc;

use crate::record::CredentialRecord;

pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by collaborators (identity stores, init hooks).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("credentials type {0} is not supported")]
    UnsupportedCredentialType(String),
    #[error("payload must not be undefined")]
    MissingPayload,
    #[error("Invalid payload for credentials type {kind}: {reason}")]
    InvalidPayload { kind: String, reason: String },
    #[error("Failed to load identities for user \"{subject_id}\" and provider \"{provider}\"")]
    IdentityNotFound { subject_id: String, provider: String },
    #[error(
        "Found {count} identities for user \"{subject_id}\" and provider \"{provider}\", expected exactly one"
    )]
    AmbiguousIdentity {
        subject_id: String,
        provider: String,
        count: usize,
    },
    #[error("No credentials found for user \"{subject_id}\" and provider \"{provider}\"")]
    CredentialsNotFound { subject_id: String, provider: String },
    #[error("Auth provider with name \"{0}\" is not registered")]
    ProviderNotRegistered(String),
    #[error("Failed to refresh credentials: {0}")]
    RefreshFailed(String),
    #[error("Failed to persist credentials: {source}")]
    PersistenceFailed {
        #[source]
        source: BoxError,
        /// Credentials that were issued but could not be stored.
        /// Set when persisting the result of a refresh fails.
        unsaved: Option<Box<CredentialRecord>>,
    },
    #[error("Failed to initialize credentials for user \"{subject_id}\": {source}")]
    InitializationFailed {
        subject_id: String,
        #[source]
        source: BoxError,
    },
    #[error("Failed to query identities for user \"{subject_id}\": {source}")]
    IdentityQueryFailed {
        subject_id: String,
        #[source]
        source: BoxError,
    },
    #[error("Invalid subject in request params: {0}")]
    InvalidSubject(String),
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
    #[error("Value cannot be used as a header value. Must be ASCII.")]
    InvalidHeaderValue,
    #[error("Request failed: {0}")]
    ReqwestFailed(#[from] Arc<reqwest::Error>),
}

impl Error {
    pub(crate) fn persistence(source: impl Into<BoxError>) -> Self {
        Self::PersistenceFailed {
            source: source.into(),
            unsaved: None,
        }
    }

    /// Transient failures a caller may choose to retry at a higher layer.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RefreshFailed(_)
                | Self::PersistenceFailed { .. }
                | Self::IdentityQueryFailed { .. }
        )
    }

    /// Deployment defects that will not go away by retrying.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::ProviderNotRegistered(_) | Self::InvalidOptions(_))
    }

    /// Fresh credentials that were issued but could not be persisted.
    #[must_use]
    pub fn unsaved_credentials(&self) -> Option<&CredentialRecord> {
        match self {
            Self::PersistenceFailed { unsaved, .. } => unsaved.as_deref(),
            _ => None,
        }
    }
}
