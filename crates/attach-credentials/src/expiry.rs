use chrono::{DateTime, TimeDelta, Utc};

use crate::record::CredentialRecord;

/// Decides whether stored credentials must be refreshed before use.
///
/// Implementations must be free of side effects.
pub trait ExpiryPolicy: Send + Sync + std::fmt::Debug {
    fn is_expired(&self, record: &CredentialRecord) -> bool;
}

/// Credentials are expired once `expires_at` lies strictly in the past.
/// Records without `expires_at` never expire.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictExpiry;

impl StrictExpiry {
    #[must_use]
    pub fn is_expired_at(record: &CredentialRecord, now: DateTime<Utc>) -> bool {
        record.expires_at.is_some_and(|expires_at| expires_at < now)
    }
}

impl ExpiryPolicy for StrictExpiry {
    fn is_expired(&self, record: &CredentialRecord) -> bool {
        Self::is_expired_at(record, Utc::now())
    }
}

/// Treats credentials as expired `tolerance` before `expires_at`,
/// so a token does not run out while a request is in flight.
#[derive(Debug, Clone, Copy)]
pub struct ToleranceExpiry {
    tolerance: TimeDelta,
}

impl ToleranceExpiry {
    #[must_use]
    pub fn new(tolerance: std::time::Duration) -> Self {
        Self {
            tolerance: TimeDelta::from_std(tolerance).unwrap_or(TimeDelta::MAX),
        }
    }

    #[must_use]
    pub fn is_expired_at(&self, record: &CredentialRecord, now: DateTime<Utc>) -> bool {
        let now = now.checked_add_signed(self.tolerance).unwrap_or(DateTime::<Utc>::MAX_UTC);
        StrictExpiry::is_expired_at(record, now)
    }
}

impl Default for ToleranceExpiry {
    /// 30 seconds tolerance.
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(30))
    }
}

impl ExpiryPolicy for ToleranceExpiry {
    fn is_expired(&self, record: &CredentialRecord) -> bool {
        self.is_expired_at(record, Utc::now())
    }
}
