//! # Lock Service
//!
//! Time-bounded, renewable exclusive lease per release: only one scheduler
//! instance advances a given release at a time. `Busy` is a normal outcome,
//! not an error — callers skip the release until the next tick. A crashed
//! holder simply leaves its lease to expire, after which any instance can
//! reclaim it.

use crate::error::Result;
use crate::models::Lease;
use crate::store::EngineStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Outcome of a lock acquisition attempt.
#[derive(Debug, Clone)]
pub enum LockOutcome {
    Acquired(Lease),
    Busy,
}

#[derive(Clone)]
pub struct LockService {
    store: Arc<EngineStore>,
    ttl: Duration,
}

impl LockService {
    pub fn new(store: Arc<EngineStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn acquire(&self, release_id: Uuid) -> LockOutcome {
        match self.store.try_acquire_lock(release_id, self.ttl) {
            Some(lease) => {
                debug!(
                    release_id = %release_id,
                    owner_token = %lease.owner_token,
                    expires_at = %lease.expires_at,
                    "acquired cron lock"
                );
                LockOutcome::Acquired(lease)
            }
            None => LockOutcome::Busy,
        }
    }

    /// Extend a held lease; fails if it was reclaimed after expiring.
    pub fn renew(&self, lease: &Lease) -> Result<Lease> {
        self.store.renew_lock(lease, self.ttl)
    }

    pub fn release(&self, lease: &Lease) {
        if !self.store.release_lock(lease) {
            // The lease expired mid-tick and another instance reclaimed it.
            // The conditional updates on tasks and uploads already protected
            // the overlap; nothing to clean up.
            warn!(
                release_id = %lease.release_id,
                owner_token = %lease.owner_token,
                "cron lock was reclaimed before release"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_then_busy_then_release() {
        let store = Arc::new(EngineStore::new());
        let service = LockService::new(store, Duration::from_secs(60));
        let release_id = Uuid::new_v4();

        let lease = match service.acquire(release_id) {
            LockOutcome::Acquired(lease) => lease,
            LockOutcome::Busy => panic!("first acquire must succeed"),
        };
        assert!(matches!(service.acquire(release_id), LockOutcome::Busy));

        let renewed = service.renew(&lease).unwrap();
        assert!(renewed.expires_at >= lease.expires_at);

        service.release(&renewed);
        assert!(matches!(
            service.acquire(release_id),
            LockOutcome::Acquired(_)
        ));
    }
}
