//! # Cron Scheduler
//!
//! The top-level tick loop, invoked on a fixed interval by an external timer.
//! For every release not yet DONE: attempt the per-release lock; on success
//! run sequencing → dispatch → polling → (regression) cycle management in
//! that fixed order, then release the lock; on Busy, skip until the next
//! tick. Every step is individually idempotent, so a crashed instance simply
//! leaves its lease to expire and the next tick resumes from any point.
//!
//! A task dispatched within a tick is deliberately not polled in the same
//! tick: the polling passes are restricted to the tasks that were already in
//! flight before dispatch ran.

use crate::cycles::RegressionCycleManager;
use crate::error::Result;
use crate::executor::TaskExecutor;
use crate::locking::{LockOutcome, LockService};
use crate::models::{Release, ReleasePhase, Stage};
use crate::polling::WorkflowPollingService;
use crate::sequencer::TaskSequencer;
use crate::store::EngineStore;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Outcome of one full scheduler tick across all active releases.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickSummary {
    pub ticked: usize,
    pub busy: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct CronScheduler {
    store: Arc<EngineStore>,
    locks: LockService,
    sequencer: TaskSequencer,
    executor: TaskExecutor,
    polling: WorkflowPollingService,
    cycles: RegressionCycleManager,
}

impl CronScheduler {
    pub fn new(
        store: Arc<EngineStore>,
        locks: LockService,
        sequencer: TaskSequencer,
        executor: TaskExecutor,
        polling: WorkflowPollingService,
        cycles: RegressionCycleManager,
    ) -> Self {
        Self {
            store,
            locks,
            sequencer,
            executor,
            polling,
            cycles,
        }
    }

    /// One tick over every active release. Busy locks are skipped, not
    /// errors; per-release failures are logged and counted but never stop
    /// the loop.
    pub async fn run_tick(&self) -> TickSummary {
        let mut summary = TickSummary::default();
        for release in self.store.active_releases() {
            match self.locks.acquire(release.id) {
                LockOutcome::Busy => {
                    debug!(release_id = %release.id, "release locked by another instance, skipping");
                    summary.busy += 1;
                }
                LockOutcome::Acquired(lease) => {
                    let result = self.advance_release(release.id).await;
                    self.locks.release(&lease);
                    match result {
                        Ok(()) => summary.ticked += 1,
                        Err(e) => {
                            error!(release_id = %release.id, error = %e, "release tick failed");
                            summary.failed += 1;
                        }
                    }
                }
            }
        }
        summary
    }

    /// Advance a single release by one tick. The caller holds the lock.
    pub async fn advance_release(&self, release_id: Uuid) -> Result<()> {
        let release = self.store.get_release(release_id)?;
        let Some(stage) = release.phase.as_stage() else {
            return Ok(());
        };
        let now = Utc::now();

        self.sequencer.seed_stage(&release, stage);

        // Snapshot in-flight work before dispatch: just-started jobs are
        // polled on the next tick, not this one.
        let pre_dispatch: HashSet<Uuid> = self
            .store
            .tasks_for_release(release.id)
            .into_iter()
            .filter(|t| t.status.is_in_flight())
            .map(|t| t.id)
            .collect();

        for task in self.sequencer.compute_eligible(&release, stage, now) {
            if let Err(e) = self.executor.dispatch(&release, &task).await {
                // The dispatch result itself is recorded on the task; an
                // error here means a concurrent writer beat this instance.
                debug!(task_id = %task.id, error = %e, "dispatch write lost");
            }
        }

        self.polling
            .poll_pending_among(&release, Some(&pre_dispatch))
            .await;
        self.polling
            .poll_running_among(&release, Some(&pre_dispatch))
            .await;

        if stage == Stage::Regression {
            self.cycles.tick(&release, now).await?;
        }

        self.advance_phase_if_complete(&release, stage)
    }

    /// Kickoff and post-regression advance automatically once their task
    /// sets complete; regression advances only through the approval gate.
    fn advance_phase_if_complete(&self, release: &Release, stage: Stage) -> Result<()> {
        let tasks = self.store.tasks_for_stage(release.id, stage);
        if !TaskSequencer::stage_complete(&tasks) {
            return Ok(());
        }
        match stage {
            Stage::Kickoff => {
                let advanced = self.store.set_phase(
                    release.id,
                    ReleasePhase::Kickoff,
                    ReleasePhase::Regression,
                )?;
                self.sequencer.seed_stage(&advanced, Stage::Regression);
                info!(release_id = %release.id, "kickoff complete, entered REGRESSION");
            }
            Stage::Regression => {}
            Stage::PostRegression => {
                self.store.set_phase(
                    release.id,
                    ReleasePhase::PostRegression,
                    ReleasePhase::Done,
                )?;
                info!(release_id = %release.id, "post-regression complete, release DONE");
            }
        }
        Ok(())
    }
}
