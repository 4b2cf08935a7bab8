//! Per-release cron lock row and the lease handle held by a tick.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The stored lock row: at most one live row per release. Mutated only
/// through the store's conditional lock operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronLock {
    pub release_id: Uuid,
    pub owner_token: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl CronLock {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// The caller-held handle for a granted lock. Renew and release succeed only
/// while the stored row still carries this owner token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    pub release_id: Uuid,
    pub owner_token: Uuid,
    pub expires_at: DateTime<Utc>,
}
