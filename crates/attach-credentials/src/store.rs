use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        RwLock,
    },
};

use async_trait::async_trait;

use crate::{error::BoxError, record::CredentialRecord};

/// Identifier of an identity entry in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityId(pub String);

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Relation of the subject holding provider credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityRelation {
    /// Identities the subject signed in with.
    Identities,
    /// Accounts linked to the subject after sign in.
    Credentials,
}

impl IdentityRelation {
    /// Linked providers (names ending in `-link`) keep their credentials in
    /// `credentials`, all others in `identities`.
    #[must_use]
    pub fn for_provider(provider: &str) -> Self {
        if provider.ends_with("-link") {
            Self::Credentials
        } else {
            Self::Identities
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identities => "identities",
            Self::Credentials => "credentials",
        }
    }
}

/// Lookup of the identities of one subject for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityQuery<'a> {
    pub subject_id: &'a str,
    pub provider: &'a str,
    pub relation: IdentityRelation,
    /// Name of the lookup method stores may dispatch on.
    pub method: &'a str,
}

/// An identity entry together with its stored credentials.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub id: IdentityId,
    pub record: CredentialRecord,
}

/// Result of [`IdentityStore::create_record`].
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    /// The identity was created by this call.
    Created(Identity),
    /// An identity for the (subject, provider) pair already existed.
    Existing(Identity),
}

impl CreateOutcome {
    #[must_use]
    pub fn into_identity(self) -> Identity {
        match self {
            Self::Created(identity) | Self::Existing(identity) => identity,
        }
    }
}

/// Persistence of credential records.
///
/// `create_record` must be atomic per (subject, provider): of several concurrent
/// calls, exactly one returns [`CreateOutcome::Created`]. This is what keeps
/// concurrent first use of a subject from creating duplicate identities.
#[async_trait]
pub trait IdentityStore: Send + Sync + fmt::Debug {
    async fn query_records(&self, query: &IdentityQuery<'_>) -> Result<Vec<Identity>, BoxError>;

    async fn create_record(
        &self,
        subject_id: &str,
        provider: &str,
        initial: CredentialRecord,
    ) -> Result<CreateOutcome, BoxError>;

    async fn update_record_payload(
        &self,
        id: &IdentityId,
        record: &CredentialRecord,
    ) -> Result<Identity, BoxError>;
}

#[derive(Debug, Clone)]
struct StoredIdentity {
    subject_id: String,
    provider: String,
    identity: Identity,
}

/// In-memory [`IdentityStore`].
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    identities: RwLock<Vec<StoredIdentity>>,
    created: AtomicUsize,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with an identity.
    #[must_use]
    pub fn with_identity(self, subject_id: &str, provider: &str, record: CredentialRecord) -> Self {
        push(&mut self.write(), subject_id, provider, record);
        self
    }

    /// Number of identities created through [`IdentityStore::create_record`].
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Stored records of a subject for a provider.
    #[must_use]
    pub fn records(&self, subject_id: &str, provider: &str) -> Vec<CredentialRecord> {
        self.read()
            .iter()
            .filter(|s| s.subject_id == subject_id && s.provider == provider)
            .map(|s| s.identity.record.clone())
            .collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<StoredIdentity>> {
        self.identities
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<StoredIdentity>> {
        self.identities
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn push(
    identities: &mut Vec<StoredIdentity>,
    subject_id: &str,
    provider: &str,
    record: CredentialRecord,
) -> Identity {
    let identity = Identity {
        id: IdentityId(format!("identity-{}", identities.len() + 1)),
        record,
    };
    identities.push(StoredIdentity {
        subject_id: subject_id.to_string(),
        provider: provider.to_string(),
        identity: identity.clone(),
    });
    identity
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn query_records(&self, query: &IdentityQuery<'_>) -> Result<Vec<Identity>, BoxError> {
        Ok(self
            .read()
            .iter()
            .filter(|s| s.subject_id == query.subject_id && s.provider == query.provider)
            .map(|s| s.identity.clone())
            .collect())
    }

    async fn create_record(
        &self,
        subject_id: &str,
        provider: &str,
        initial: CredentialRecord,
    ) -> Result<CreateOutcome, BoxError> {
        let mut identities = self.write();
        if let Some(existing) = identities
            .iter()
            .find(|s| s.subject_id == subject_id && s.provider == provider)
        {
            return Ok(CreateOutcome::Existing(existing.identity.clone()));
        }

        let identity = push(&mut identities, subject_id, provider, initial);
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(CreateOutcome::Created(identity))
    }

    async fn update_record_payload(
        &self,
        id: &IdentityId,
        record: &CredentialRecord,
    ) -> Result<Identity, BoxError> {
        let mut identities = self.write();
        let stored = identities
            .iter_mut()
            .find(|s| &s.identity.id == id)
            .ok_or_else(|| format!("Identity {id} does not exist"))?;
        stored.identity.record = record.clone();
        Ok(stored.identity.clone())
    }
}
