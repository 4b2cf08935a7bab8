//! # Engine State Store
//!
//! In-memory state for releases, tasks, cycles, uploads, regression slots and
//! cron locks. Every mutation is a conditional update guarded on the expected
//! current state: a writer that lost a race gets [`EngineError::Conflict`]
//! instead of silently overwriting. Combined with the task state machine's
//! legality table, this is the engine's sole concurrency-control mechanism
//! beyond the per-release cron lock, and it covers the window where a lock
//! expires mid-tick and two scheduler instances briefly overlap.
//!
//! Task rows are never deleted; their identity is stable per
//! `(release, stage, type, platform)` so re-seeding a stage is a no-op.

use crate::error::{EngineError, Result};
use crate::models::{
    BuildUpload, CronLock, CycleStatus, Lease, Platform, RegressionCycle, RegressionSlot, Release,
    ReleasePhase, ReleaseTask, Stage, TaskKey, UploadConsumer, UploadSource,
};
use crate::state_machine::TaskStatus;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct EngineStore {
    releases: DashMap<Uuid, Release>,
    tasks: DashMap<Uuid, ReleaseTask>,
    task_index: DashMap<(Uuid, TaskKey), Uuid>,
    cycles: DashMap<Uuid, RegressionCycle>,
    uploads: DashMap<Uuid, BuildUpload>,
    locks: DashMap<Uuid, CronLock>,
    slots: DashMap<Uuid, Vec<RegressionSlot>>,
}

impl EngineStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- releases ----

    pub fn insert_release(&self, release: Release) -> Result<Release> {
        match self.releases.entry(release.id) {
            Entry::Occupied(_) => Err(EngineError::conflict(format!(
                "release {} already exists",
                release.id
            ))),
            Entry::Vacant(v) => {
                v.insert(release.clone());
                Ok(release)
            }
        }
    }

    pub fn get_release(&self, release_id: Uuid) -> Result<Release> {
        self.releases
            .get(&release_id)
            .map(|r| r.clone())
            .ok_or_else(|| EngineError::not_found(format!("release {release_id}")))
    }

    pub fn list_releases(&self) -> Vec<Release> {
        let mut releases: Vec<_> = self.releases.iter().map(|r| r.clone()).collect();
        releases.sort_by_key(|r| r.created_at);
        releases
    }

    pub fn active_releases(&self) -> Vec<Release> {
        self.list_releases()
            .into_iter()
            .filter(|r| !r.phase.is_done())
            .collect()
    }

    /// Advance a release phase, guarded on the expected current phase.
    pub fn set_phase(
        &self,
        release_id: Uuid,
        expected: ReleasePhase,
        next: ReleasePhase,
    ) -> Result<Release> {
        let mut entry = self
            .releases
            .get_mut(&release_id)
            .ok_or_else(|| EngineError::not_found(format!("release {release_id}")))?;
        if entry.phase != expected {
            return Err(EngineError::conflict(format!(
                "release {release_id} is in phase {}, expected {expected}",
                entry.phase
            )));
        }
        entry.phase = next;
        Ok(entry.clone())
    }

    // ---- tasks ----

    /// Insert a task if no task with the same identity exists yet.
    /// Returns the stored task and whether this call created it.
    pub fn create_task_if_absent(&self, task: ReleaseTask) -> (ReleaseTask, bool) {
        match self.task_index.entry((task.release_id, task.key())) {
            Entry::Occupied(o) => {
                let existing_id = *o.get();
                drop(o);
                let existing = self
                    .tasks
                    .get(&existing_id)
                    .map(|t| t.clone())
                    .unwrap_or(task);
                (existing, false)
            }
            Entry::Vacant(v) => {
                v.insert(task.id);
                self.tasks.insert(task.id, task.clone());
                (task, true)
            }
        }
    }

    pub fn get_task(&self, task_id: Uuid) -> Result<ReleaseTask> {
        self.tasks
            .get(&task_id)
            .map(|t| t.clone())
            .ok_or_else(|| EngineError::not_found(format!("task {task_id}")))
    }

    pub fn find_task(&self, release_id: Uuid, key: TaskKey) -> Option<ReleaseTask> {
        let id = *self.task_index.get(&(release_id, key))?;
        self.tasks.get(&id).map(|t| t.clone())
    }

    pub fn tasks_for_release(&self, release_id: Uuid) -> Vec<ReleaseTask> {
        let mut tasks: Vec<_> = self
            .tasks
            .iter()
            .filter(|t| t.release_id == release_id)
            .map(|t| t.clone())
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    pub fn tasks_for_stage(&self, release_id: Uuid, stage: Stage) -> Vec<ReleaseTask> {
        self.tasks_for_release(release_id)
            .into_iter()
            .filter(|t| t.stage == stage)
            .collect()
    }

    /// Transition a task, guarded on its expected current status and on the
    /// state machine's legality table. `apply` runs inside the guard to set
    /// conclusion, external id/data, etc.
    pub fn transition_task<F>(
        &self,
        task_id: Uuid,
        expected: &[TaskStatus],
        to: TaskStatus,
        apply: F,
    ) -> Result<ReleaseTask>
    where
        F: FnOnce(&mut ReleaseTask),
    {
        let mut entry = self
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| EngineError::not_found(format!("task {task_id}")))?;
        let current = entry.status;
        if !expected.contains(&current) {
            return Err(EngineError::conflict(format!(
                "task {task_id} is {current}, expected one of {expected:?}"
            )));
        }
        if !current.can_transition_to(to) {
            return Err(EngineError::invalid_transition(format!(
                "task {task_id}: {current} -> {to}"
            )));
        }
        entry.status = to;
        entry.updated_at = Utc::now();
        apply(&mut *entry);
        Ok(entry.clone())
    }

    // ---- cron locks ----

    /// Acquire the per-release lock. Succeeds only if no unexpired lease
    /// exists; an expired lease is reclaimable regardless of prior owner.
    pub fn try_acquire_lock(&self, release_id: Uuid, ttl: Duration) -> Option<Lease> {
        let now = Utc::now();
        let expires_at = now
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(300));
        let lock = CronLock {
            release_id,
            owner_token: Uuid::new_v4(),
            expires_at,
        };
        let lease = Lease {
            release_id,
            owner_token: lock.owner_token,
            expires_at,
        };
        match self.locks.entry(release_id) {
            Entry::Occupied(mut o) => {
                if o.get().is_expired_at(now) {
                    o.insert(lock);
                    Some(lease)
                } else {
                    None
                }
            }
            Entry::Vacant(v) => {
                v.insert(lock);
                Some(lease)
            }
        }
    }

    /// Extend a held lease. Fails if the stored row no longer carries the
    /// caller's owner token (the lease expired and was reclaimed).
    pub fn renew_lock(&self, lease: &Lease, ttl: Duration) -> Result<Lease> {
        let mut entry = self
            .locks
            .get_mut(&lease.release_id)
            .ok_or_else(|| EngineError::conflict(format!("lock for {} is gone", lease.release_id)))?;
        if entry.owner_token != lease.owner_token {
            return Err(EngineError::conflict(format!(
                "lock for {} was reclaimed by another owner",
                lease.release_id
            )));
        }
        entry.expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(300));
        Ok(Lease {
            release_id: lease.release_id,
            owner_token: lease.owner_token,
            expires_at: entry.expires_at,
        })
    }

    /// Delete the lock row if the caller still owns it. Returns whether a
    /// row was removed; a false return means the lease had been reclaimed.
    pub fn release_lock(&self, lease: &Lease) -> bool {
        self.locks
            .remove_if(&lease.release_id, |_, lock| {
                lock.owner_token == lease.owner_token
            })
            .is_some()
    }

    // ---- build uploads ----

    /// Stage a build, replacing an existing *unused* upload for the same
    /// `(release, stage, platform)` in place. A used upload is immutable;
    /// staging again after consumption creates a fresh row.
    pub fn upsert_upload(
        &self,
        release_id: Uuid,
        stage: Stage,
        platform: Platform,
        source: UploadSource,
        artifact_ref: String,
    ) -> Result<BuildUpload> {
        for mut existing in self.uploads.iter_mut() {
            if existing.release_id == release_id
                && existing.stage == stage
                && existing.platform == platform
                && !existing.is_used
            {
                existing.source = source;
                existing.artifact_ref = artifact_ref;
                existing.created_at = Utc::now();
                return Ok(existing.clone());
            }
        }
        let upload = BuildUpload::new(release_id, platform, stage, source, artifact_ref);
        self.uploads.insert(upload.id, upload.clone());
        Ok(upload)
    }

    /// Flip `is_used`, exactly once. A second consumption attempt conflicts.
    pub fn mark_upload_used(&self, upload_id: Uuid, consumer: UploadConsumer) -> Result<BuildUpload> {
        let mut entry = self
            .uploads
            .get_mut(&upload_id)
            .ok_or_else(|| EngineError::not_found(format!("upload {upload_id}")))?;
        if entry.is_used {
            return Err(EngineError::conflict(format!(
                "upload {upload_id} already consumed"
            )));
        }
        entry.is_used = true;
        match consumer {
            UploadConsumer::Task(id) => entry.used_by_task_id = Some(id),
            UploadConsumer::Cycle(id) => entry.used_by_cycle_id = Some(id),
        }
        Ok(entry.clone())
    }

    /// Delete an upload; used uploads are undeletable.
    pub fn delete_upload(&self, upload_id: Uuid) -> Result<()> {
        let entry = self
            .uploads
            .get(&upload_id)
            .ok_or_else(|| EngineError::not_found(format!("upload {upload_id}")))?;
        if entry.is_used {
            return Err(EngineError::conflict(format!(
                "upload {upload_id} is consumed and cannot be deleted"
            )));
        }
        drop(entry);
        self.uploads
            .remove_if(&upload_id, |_, upload| !upload.is_used)
            .map(|_| ())
            .ok_or_else(|| EngineError::conflict(format!("upload {upload_id} is consumed and cannot be deleted")))
    }

    pub fn unused_uploads(&self, release_id: Uuid, stage: Stage) -> Vec<BuildUpload> {
        let mut uploads: Vec<_> = self
            .uploads
            .iter()
            .filter(|u| u.release_id == release_id && u.stage == stage && !u.is_used)
            .map(|u| u.clone())
            .collect();
        uploads.sort_by_key(|u| u.created_at);
        uploads
    }

    pub fn find_unused_upload(
        &self,
        release_id: Uuid,
        stage: Stage,
        platform: Platform,
    ) -> Option<BuildUpload> {
        self.unused_uploads(release_id, stage)
            .into_iter()
            .find(|u| u.platform == platform)
    }

    // ---- regression cycles ----

    pub fn insert_cycle(&self, cycle: RegressionCycle) -> RegressionCycle {
        self.cycles.insert(cycle.id, cycle.clone());
        cycle
    }

    /// All cycles for a release, oldest first. "Latest" is derived from this
    /// ordering rather than stored.
    pub fn cycles_for_release(&self, release_id: Uuid) -> Vec<RegressionCycle> {
        let mut cycles: Vec<_> = self
            .cycles
            .iter()
            .filter(|c| c.release_id == release_id)
            .map(|c| c.clone())
            .collect();
        cycles.sort_by_key(|c| c.created_at);
        cycles
    }

    /// The cycle currently blocking new cycle creation and approval, if any.
    pub fn open_cycle(&self, release_id: Uuid) -> Option<RegressionCycle> {
        self.cycles_for_release(release_id)
            .into_iter()
            .rev()
            .find(|c| c.status.is_open())
    }

    pub fn transition_cycle<F>(
        &self,
        cycle_id: Uuid,
        expected: &[CycleStatus],
        to: CycleStatus,
        apply: F,
    ) -> Result<RegressionCycle>
    where
        F: FnOnce(&mut RegressionCycle),
    {
        let mut entry = self
            .cycles
            .get_mut(&cycle_id)
            .ok_or_else(|| EngineError::not_found(format!("cycle {cycle_id}")))?;
        if !expected.contains(&entry.status) {
            return Err(EngineError::conflict(format!(
                "cycle {cycle_id} is {}, expected one of {expected:?}",
                entry.status
            )));
        }
        entry.status = to;
        apply(&mut *entry);
        Ok(entry.clone())
    }

    // ---- regression slots ----

    pub fn set_slots(&self, release_id: Uuid, slots: Vec<RegressionSlot>) {
        self.slots.insert(release_id, slots);
    }

    pub fn slots_for(&self, release_id: Uuid) -> Vec<RegressionSlot> {
        self.slots
            .get(&release_id)
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}
