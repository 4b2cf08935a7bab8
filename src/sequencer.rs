//! # Task Sequencer
//!
//! Defines the canonical task set and prerequisite wiring for each stage,
//! seeds a stage's tasks idempotently on entry, and computes which PENDING
//! tasks are eligible to dispatch: all prerequisites COMPLETED with success,
//! nothing already in flight. A prerequisite that completed with a failure
//! conclusion, or failed outright, permanently blocks its dependents until a
//! human retries it; the sequencer never auto-retries.
//!
//! The stage graph is fixed (kickoff → regression → post-regression), not
//! user-defined. Dependencies may reach into an earlier stage: the regression
//! build triggers depend on the kickoff fork task.

use crate::models::{
    BuildMode, Release, ReleaseTask, Stage, TaskKey, TaskType,
};
use crate::state_machine::TaskStatus;
use crate::store::EngineStore;
use crate::uploads::BuildUploadLedger;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Derived status of a stage, reported through the task surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    NotStarted,
    InProgress,
    /// A failed task is gating pending dependents; needs a manual retry.
    Blocked,
    Completed,
}

/// One entry of a stage's canonical task set.
struct TaskSpec {
    task_type: TaskType,
    platform: Option<crate::models::Platform>,
    depends_on: Vec<TaskKey>,
}

#[derive(Clone)]
pub struct TaskSequencer {
    store: Arc<EngineStore>,
    ledger: BuildUploadLedger,
}

impl TaskSequencer {
    pub fn new(store: Arc<EngineStore>, ledger: BuildUploadLedger) -> Self {
        Self { store, ledger }
    }

    /// The canonical task set for a stage of this release.
    fn stage_template(release: &Release, stage: Stage) -> Vec<TaskSpec> {
        let fork = TaskKey::new(Stage::Kickoff, TaskType::ForkBranch, None);
        match stage {
            Stage::Kickoff => vec![
                TaskSpec {
                    task_type: TaskType::ForkBranch,
                    platform: None,
                    depends_on: vec![],
                },
                TaskSpec {
                    task_type: TaskType::CreateTicket,
                    platform: None,
                    depends_on: vec![fork],
                },
                TaskSpec {
                    task_type: TaskType::NotifyKickoff,
                    platform: None,
                    depends_on: vec![fork],
                },
            ],
            Stage::Regression => {
                let mut specs = Vec::new();
                let mut cycle_deps = Vec::new();
                if release.build_mode == BuildMode::Ci {
                    for platform in &release.platforms {
                        let key = TaskKey::new(
                            Stage::Regression,
                            TaskType::TriggerPlatformBuild,
                            Some(*platform),
                        );
                        specs.push(TaskSpec {
                            task_type: TaskType::TriggerPlatformBuild,
                            platform: Some(*platform),
                            depends_on: vec![fork],
                        });
                        cycle_deps.push(key);
                    }
                }
                // In manual-upload mode cycle creation has no task
                // prerequisites; it is gated on ledger readiness instead.
                specs.push(TaskSpec {
                    task_type: TaskType::CreateRegressionCycle,
                    platform: None,
                    depends_on: cycle_deps,
                });
                let cycle =
                    TaskKey::new(Stage::Regression, TaskType::CreateRegressionCycle, None);
                for platform in &release.platforms {
                    specs.push(TaskSpec {
                        task_type: TaskType::CreateTestRun,
                        platform: Some(*platform),
                        depends_on: vec![cycle],
                    });
                }
                specs
            }
            Stage::PostRegression => {
                let tag = TaskKey::new(Stage::PostRegression, TaskType::CreateReleaseTag, None);
                vec![
                    TaskSpec {
                        task_type: TaskType::GenerateReleaseNotes,
                        platform: None,
                        depends_on: vec![],
                    },
                    TaskSpec {
                        task_type: TaskType::CreateReleaseTag,
                        platform: None,
                        depends_on: vec![],
                    },
                    TaskSpec {
                        task_type: TaskType::NotifyRelease,
                        platform: None,
                        depends_on: vec![tag],
                    },
                ]
            }
        }
    }

    /// Create the full fixed task set for a stage. Idempotent: re-entering a
    /// stage whose tasks already exist is a no-op. Returns the stage's tasks.
    pub fn seed_stage(&self, release: &Release, stage: Stage) -> Vec<ReleaseTask> {
        let mut created = 0usize;
        for spec in Self::stage_template(release, stage) {
            let mut dep_ids = Vec::with_capacity(spec.depends_on.len());
            for dep_key in &spec.depends_on {
                match self.store.find_task(release.id, *dep_key) {
                    Some(dep) => dep_ids.push(dep.id),
                    // Fixed graph: prerequisites are seeded by an earlier
                    // stage or earlier in this template order.
                    None => warn!(
                        release_id = %release.id,
                        dependency = %dep_key,
                        "prerequisite task missing while seeding stage"
                    ),
                }
            }
            let task = ReleaseTask::new(release.id, stage, spec.task_type, spec.platform, dep_ids);
            let (_, was_created) = self.store.create_task_if_absent(task);
            if was_created {
                created += 1;
            }
        }
        if created > 0 {
            info!(
                release_id = %release.id,
                stage = %stage,
                created = created,
                "seeded stage task set"
            );
        }
        self.store.tasks_for_stage(release.id, stage)
    }

    /// PENDING tasks whose prerequisites are all COMPLETED with success,
    /// excluding anything already in flight, honoring the manual-upload and
    /// slot gates on regression-cycle creation.
    pub fn compute_eligible(
        &self,
        release: &Release,
        stage: Stage,
        now: DateTime<Utc>,
    ) -> Vec<ReleaseTask> {
        let tasks = self.store.tasks_for_stage(release.id, stage);
        tasks
            .into_iter()
            .filter(|task| task.status == TaskStatus::Pending)
            .filter(|task| self.dependencies_satisfied(task))
            .filter(|task| self.extra_gates_open(release, task, now))
            .collect()
    }

    fn dependencies_satisfied(&self, task: &ReleaseTask) -> bool {
        task.depends_on.iter().all(|dep_id| {
            match self.store.get_task(*dep_id) {
                Ok(dep) => {
                    let satisfied = dep.succeeded();
                    if !satisfied {
                        debug!(
                            task_id = %task.id,
                            dependency = %dep.key(),
                            dependency_status = %dep.status,
                            "prerequisite not satisfied"
                        );
                    }
                    satisfied
                }
                Err(_) => false,
            }
        })
    }

    /// Gates beyond task prerequisites: regression-cycle creation waits for
    /// its scheduled slot and, in manual-upload mode, for all platform builds
    /// to be staged.
    fn extra_gates_open(&self, release: &Release, task: &ReleaseTask, now: DateTime<Utc>) -> bool {
        if task.task_type != TaskType::CreateRegressionCycle {
            return true;
        }
        let slots = self.store.slots_for(release.id);
        if let Some(first) = slots.first() {
            if !first.is_due(release.kickoff_at, now) {
                return false;
            }
        }
        if release.build_mode == BuildMode::ManualUpload {
            return self.ledger.readiness(release, task.stage).all_ready;
        }
        true
    }

    /// Derived stage status for the task surface.
    pub fn stage_status(tasks: &[ReleaseTask]) -> StageStatus {
        if tasks.is_empty() {
            return StageStatus::NotStarted;
        }
        if tasks.iter().all(ReleaseTask::succeeded) {
            return StageStatus::Completed;
        }
        let failed = tasks.iter().any(|t| {
            t.status == TaskStatus::Failed
                || (t.status == TaskStatus::Completed && !t.succeeded())
        });
        if failed {
            StageStatus::Blocked
        } else {
            StageStatus::InProgress
        }
    }

    /// A stage is complete when every task in it succeeded.
    pub fn stage_complete(tasks: &[ReleaseTask]) -> bool {
        Self::stage_status(tasks) == StageStatus::Completed
    }
}
