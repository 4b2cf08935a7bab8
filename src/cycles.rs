//! # Regression Cycle Manager and Approval Gate
//!
//! Creates and tracks regression cycles, consumes staged builds, and
//! evaluates the gate that unlocks stage advancement past REGRESSION.
//!
//! A cycle opens when its scheduled slot arrives and no cycle is currently
//! open; opening a cycle cuts a cycle tag at the release branch head and, in
//! manual-upload mode, consumes one staged build per platform. A cycle goes
//! DONE once every per-platform test-run task has completed with success.
//! Subsequent cycles re-arm the test-run tasks back to PENDING so the same
//! task rows carry the next round of verification.
//!
//! The approval gate combines three independently computed booleans; the
//! cherry-pick check resolves every ambiguous or unreachable state to
//! `false`, so approval can stall but never incorrectly proceed.

use crate::error::{EngineError, Result};
use crate::models::{
    BuildMode, CycleStatus, RegressionCycle, Release, ReleasePhase, Stage, TaskType,
};
use crate::providers::{GitObjectKind, ProviderSet};
use crate::sequencer::TaskSequencer;
use crate::state_machine::TaskStatus;
use crate::store::EngineStore;
use crate::uploads::BuildUploadLedger;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The three independently computed approval booleans.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ApprovalStatus {
    pub test_management_passed: bool,
    pub cherry_pick_clean: bool,
    pub cycles_completed: bool,
    pub can_approve: bool,
}

#[derive(Clone)]
pub struct RegressionCycleManager {
    store: Arc<EngineStore>,
    ledger: BuildUploadLedger,
    providers: ProviderSet,
    sequencer: TaskSequencer,
}

impl RegressionCycleManager {
    pub fn new(
        store: Arc<EngineStore>,
        ledger: BuildUploadLedger,
        providers: ProviderSet,
        sequencer: TaskSequencer,
    ) -> Self {
        Self {
            store,
            ledger,
            providers,
            sequencer,
        }
    }

    /// Open a regression cycle: cut the cycle tag at the branch head and, in
    /// manual-upload mode, consume one staged build per platform. Conflicts
    /// if a cycle is already open.
    pub async fn start_cycle(
        &self,
        release: &Release,
        consumer_task: Option<Uuid>,
    ) -> Result<RegressionCycle> {
        if let Some(open) = self.store.open_cycle(release.id) {
            return Err(EngineError::conflict(format!(
                "cycle {} is already {}",
                open.id, open.status
            )));
        }
        let cycle_number = self.store.cycles_for_release(release.id).len() + 1;
        let tag = release.cycle_tag(cycle_number);

        let head = self
            .providers
            .scm
            .branch_head(&release.repo, &release.branch)
            .await?;
        match self
            .providers
            .scm
            .create_tag(&release.repo, &tag, &head)
            .await
        {
            Ok(_) => {}
            // The tag ref already exists: a prior attempt got this far.
            Err(e) if e.is_conflict() => {
                debug!(tag = %tag, "cycle tag already exists, continuing");
            }
            Err(e) => return Err(e),
        }

        // The cycle row goes in before build consumption so a consumed
        // upload always references an existing cycle. If consumption fails
        // (unused uploads are deletable through the HTTP surface, outside
        // the release lock), the cycle is abandoned and the next attempt
        // opens a fresh one.
        let cycle = self
            .store
            .insert_cycle(RegressionCycle::new(release.id, Some(tag.clone())));
        if release.build_mode == BuildMode::ManualUpload {
            if let Err(e) = self
                .ledger
                .consume_for_cycle(release, Stage::Regression, cycle.id)
            {
                warn!(
                    release_id = %release.id,
                    cycle_id = %cycle.id,
                    error = %e,
                    "build consumption failed, abandoning cycle"
                );
                self.store.transition_cycle(
                    cycle.id,
                    &[CycleStatus::InProgress],
                    CycleStatus::Abandoned,
                    |c| c.completed_at = Some(Utc::now()),
                )?;
                return Err(e);
            }
        }

        if cycle_number > 1 {
            self.rearm_test_runs(release)?;
        }

        info!(
            release_id = %release.id,
            cycle_id = %cycle.id,
            cycle_number = cycle_number,
            tag = %tag,
            head = %head,
            consumer_task = ?consumer_task,
            "opened regression cycle"
        );
        Ok(cycle)
    }

    /// Reset the per-platform test-run tasks to PENDING so the next cycle's
    /// verification flows through the same task rows.
    fn rearm_test_runs(&self, release: &Release) -> Result<()> {
        for task in self
            .store
            .tasks_for_stage(release.id, Stage::Regression)
            .iter()
            .filter(|t| t.task_type == TaskType::CreateTestRun)
        {
            if task.status.is_terminal() {
                self.store.transition_task(
                    task.id,
                    &[TaskStatus::Completed, TaskStatus::Failed],
                    TaskStatus::Pending,
                    |t| t.conclusion = None,
                )?;
            }
        }
        Ok(())
    }

    /// Per-tick maintenance: close the open cycle once its test runs passed,
    /// and open the next slot's cycle when it falls due.
    pub async fn tick(&self, release: &Release, now: DateTime<Utc>) -> Result<()> {
        self.complete_open_cycle(release)?;
        self.maybe_open_next_cycle(release, now).await
    }

    fn complete_open_cycle(&self, release: &Release) -> Result<()> {
        let Some(open) = self.store.open_cycle(release.id) else {
            return Ok(());
        };
        if open.status != CycleStatus::InProgress {
            return Ok(());
        }
        let test_tasks: Vec<_> = self
            .store
            .tasks_for_stage(release.id, Stage::Regression)
            .into_iter()
            .filter(|t| t.task_type == TaskType::CreateTestRun)
            .collect();
        // Re-arm resets these to PENDING at cycle open, so an all-success
        // view here belongs to this cycle.
        if !test_tasks.is_empty()
            && test_tasks.iter().all(|t| t.succeeded())
            && test_tasks.iter().all(|t| t.updated_at >= open.created_at)
        {
            let done = self.store.transition_cycle(
                open.id,
                &[CycleStatus::InProgress],
                CycleStatus::Done,
                |c| c.completed_at = Some(Utc::now()),
            )?;
            info!(
                release_id = %release.id,
                cycle_id = %done.id,
                "regression cycle completed"
            );
        }
        Ok(())
    }

    async fn maybe_open_next_cycle(&self, release: &Release, now: DateTime<Utc>) -> Result<()> {
        // The first cycle is opened by its sequenced task; only later slots
        // are handled here. Slots pair with cycles that actually ran, so
        // abandoned ones do not advance the index.
        let cycles = self.store.cycles_for_release(release.id);
        let live = cycles
            .iter()
            .filter(|c| c.status != CycleStatus::Abandoned)
            .count();
        if live == 0 || self.store.open_cycle(release.id).is_some() {
            return Ok(());
        }
        let slots = self.store.slots_for(release.id);
        let Some(slot) = slots.get(live) else {
            return Ok(());
        };
        if !slot.is_due(release.kickoff_at, now) {
            return Ok(());
        }
        if release.build_mode == BuildMode::ManualUpload
            && !self.ledger.readiness(release, Stage::Regression).all_ready
        {
            debug!(
                release_id = %release.id,
                "next cycle slot due but builds not staged"
            );
            return Ok(());
        }
        self.start_cycle(release, None).await?;
        Ok(())
    }

    /// Combine the three approval booleans. Each is computed independently;
    /// any lookup failure on the cherry-pick side resolves to blocking.
    pub async fn evaluate_approval(&self, release: &Release) -> ApprovalStatus {
        let test_management_passed = self.test_management_passed(release);
        let cherry_pick_clean = self.cherry_pick_clean(release).await;
        let cycles_completed = self.cycles_completed(release);
        ApprovalStatus {
            test_management_passed,
            cherry_pick_clean,
            cycles_completed,
            can_approve: test_management_passed && cherry_pick_clean && cycles_completed,
        }
    }

    fn test_management_passed(&self, release: &Release) -> bool {
        let test_tasks: Vec<_> = self
            .store
            .tasks_for_stage(release.id, Stage::Regression)
            .into_iter()
            .filter(|t| t.task_type == TaskType::CreateTestRun)
            .collect();
        !test_tasks.is_empty() && test_tasks.iter().all(|t| t.succeeded())
    }

    fn cycles_completed(&self, release: &Release) -> bool {
        // Abandoned cycles never produced verification; they neither count
        // nor block.
        let cycles: Vec<_> = self
            .store
            .cycles_for_release(release.id)
            .into_iter()
            .filter(|c| c.status != CycleStatus::Abandoned)
            .collect();
        !cycles.is_empty() && cycles.iter().all(|c| c.status == CycleStatus::Done)
    }

    /// True only if the release branch head equals the commit the latest
    /// cycle tag resolves to. Annotated tags are dereferenced with a
    /// two-level cap. Every failure is conservative: blocks approval.
    pub async fn cherry_pick_clean(&self, release: &Release) -> bool {
        let Some(tag) = self
            .store
            .cycles_for_release(release.id)
            .into_iter()
            .filter(|c| c.status != CycleStatus::Abandoned)
            .last()
            .and_then(|c| c.tag)
        else {
            return false;
        };
        let tag_commit = match self.resolve_tag_commit(&release.repo, &tag).await {
            Ok(sha) => sha,
            Err(e) => {
                warn!(
                    release_id = %release.id,
                    tag = %tag,
                    error = %e,
                    "cherry-pick check could not resolve tag, treating as dirty"
                );
                return false;
            }
        };
        match self
            .providers
            .scm
            .branch_head(&release.repo, &release.branch)
            .await
        {
            Ok(head) => head == tag_commit,
            Err(e) => {
                warn!(
                    release_id = %release.id,
                    error = %e,
                    "cherry-pick check could not read branch head, treating as dirty"
                );
                false
            }
        }
    }

    /// Resolve a tag ref to its commit SHA: fetch the ref target; if it is an
    /// annotated tag object rather than a commit, dereference once more, and
    /// if still not a commit, a second time. Nothing deeper resolves.
    async fn resolve_tag_commit(&self, repo: &str, tag: &str) -> Result<String> {
        let reference = format!("tags/{tag}");
        let mut target = self.providers.scm.get_ref(repo, &reference).await?;
        for _ in 0..2 {
            if target.kind == GitObjectKind::Commit {
                return Ok(target.sha);
            }
            target = self.providers.scm.get_tag_object(repo, &target.sha).await?;
        }
        if target.kind == GitObjectKind::Commit {
            Ok(target.sha)
        } else {
            Err(EngineError::not_found(format!(
                "tag {tag} does not resolve to a commit within two dereferences"
            )))
        }
    }

    /// Manual approval action: accepted only when the gate is satisfied.
    /// Advances the release to POST_REGRESSION and seeds stage-3 tasks.
    pub async fn approve(&self, release: &Release) -> Result<ApprovalStatus> {
        let status = self.evaluate_approval(release).await;
        if !status.can_approve {
            return Err(EngineError::validation(format!(
                "approval gate not satisfied: test_management_passed={}, cherry_pick_clean={}, cycles_completed={}",
                status.test_management_passed, status.cherry_pick_clean, status.cycles_completed
            )));
        }
        let advanced = self.store.set_phase(
            release.id,
            ReleasePhase::Regression,
            ReleasePhase::PostRegression,
        )?;
        self.sequencer.seed_stage(&advanced, Stage::PostRegression);
        info!(release_id = %release.id, "regression approved, advanced to POST_REGRESSION");
        Ok(status)
    }
}
