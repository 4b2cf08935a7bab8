//! # Release Engine
//!
//! Wires the store, provider adapters and services into one embeddable
//! engine. The HTTP surface and the host's timer both talk to this type:
//! the web handlers call the release/task/build/approval operations, and the
//! external cron trigger drives [`ReleaseEngine::run_tick`] plus the two
//! poll endpoints.

use crate::config::EngineConfig;
use crate::cycles::{ApprovalStatus, RegressionCycleManager};
use crate::error::{EngineError, Result};
use crate::executor::TaskExecutor;
use crate::locking::LockService;
use crate::models::{
    BuildMode, BuildUpload, Platform, RegressionCycle, RegressionSlot, Release, ReleaseTask,
    Stage,
};
use crate::polling::{PollReport, WorkflowPollingService};
use crate::providers::ProviderSet;
use crate::scheduler::{CronScheduler, TickSummary};
use crate::sequencer::{StageStatus, TaskSequencer};
use crate::state_machine::{TaskConclusion, TaskStatus};
use crate::store::EngineStore;
use crate::uploads::{BuildUploadLedger, UploadReadiness};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Parameters for registering a release with the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRelease {
    pub app_id: String,
    pub version: String,
    pub repo: String,
    pub base_branch: String,
    pub kickoff_at: DateTime<Utc>,
    pub target_release_at: DateTime<Utc>,
    pub platforms: Vec<Platform>,
    pub build_mode: BuildMode,
    #[serde(default)]
    pub regression_slots: Vec<RegressionSlot>,
}

/// Everything the task surface reports for one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageOverview {
    pub stage: Stage,
    pub status: StageStatus,
    pub tasks: Vec<ReleaseTask>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycles: Option<Vec<RegressionCycle>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval: Option<ApprovalStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_builds: Option<Vec<BuildUpload>>,
}

/// Result of staging a build through the upload surface.
#[derive(Debug, Clone, Serialize)]
pub struct StagedBuild {
    pub upload_id: Uuid,
    pub all_ready: bool,
    pub missing_platforms: Vec<Platform>,
}

#[derive(Clone)]
pub struct ReleaseEngine {
    store: Arc<EngineStore>,
    config: EngineConfig,
    ledger: BuildUploadLedger,
    sequencer: TaskSequencer,
    polling: WorkflowPollingService,
    cycles: RegressionCycleManager,
    scheduler: CronScheduler,
}

impl ReleaseEngine {
    pub fn new(config: EngineConfig, providers: ProviderSet) -> Self {
        Self::with_store(Arc::new(EngineStore::new()), config, providers)
    }

    pub fn with_store(
        store: Arc<EngineStore>,
        config: EngineConfig,
        providers: ProviderSet,
    ) -> Self {
        let ledger = BuildUploadLedger::new(Arc::clone(&store));
        let locks = LockService::new(Arc::clone(&store), config.lock_ttl());
        let sequencer = TaskSequencer::new(Arc::clone(&store), ledger.clone());
        let cycles = RegressionCycleManager::new(
            Arc::clone(&store),
            ledger.clone(),
            providers.clone(),
            sequencer.clone(),
        );
        let executor = TaskExecutor::new(
            Arc::clone(&store),
            providers.clone(),
            cycles.clone(),
            config.notification_channel.clone(),
        );
        let polling = WorkflowPollingService::new(
            Arc::clone(&store),
            providers.clone(),
            config.test_pass_threshold,
        );
        let scheduler = CronScheduler::new(
            Arc::clone(&store),
            locks,
            sequencer.clone(),
            executor,
            polling.clone(),
            cycles.clone(),
        );
        Self {
            store,
            config,
            ledger,
            sequencer,
            polling,
            cycles,
            scheduler,
        }
    }

    pub fn store(&self) -> &Arc<EngineStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---- release registry ----

    pub fn create_release(&self, params: NewRelease) -> Result<Release> {
        if params.app_id.is_empty() || params.version.is_empty() || params.repo.is_empty() {
            return Err(EngineError::validation(
                "app_id, version and repo must be non-empty",
            ));
        }
        if params.platforms.is_empty() {
            return Err(EngineError::validation(
                "a release must target at least one platform",
            ));
        }
        if params.target_release_at <= params.kickoff_at {
            return Err(EngineError::validation(
                "target release must be after kickoff",
            ));
        }
        for slot in &params.regression_slots {
            slot.validate(params.kickoff_at, params.target_release_at)?;
        }
        let release = self.store.insert_release(Release::new(
            params.app_id,
            params.version,
            params.repo,
            params.base_branch,
            params.kickoff_at,
            params.target_release_at,
            params.platforms,
            params.build_mode,
        ))?;
        self.store.set_slots(release.id, params.regression_slots);
        info!(release_id = %release.id, version = %release.version, "registered release");
        Ok(release)
    }

    pub fn list_releases(&self) -> Vec<Release> {
        self.store.list_releases()
    }

    pub fn get_release(&self, release_id: Uuid) -> Result<Release> {
        self.store.get_release(release_id)
    }

    /// Tenant-scoped lookup used by the cron poll endpoints.
    fn get_release_for_app(&self, release_id: Uuid, app_id: &str) -> Result<Release> {
        let release = self.store.get_release(release_id)?;
        if release.app_id != app_id {
            return Err(EngineError::not_found(format!(
                "release {release_id} for app {app_id}"
            )));
        }
        Ok(release)
    }

    // ---- task surface ----

    pub async fn stage_overview(&self, release_id: Uuid, stage: Stage) -> Result<StageOverview> {
        let release = self.store.get_release(release_id)?;
        let tasks = self.store.tasks_for_stage(release_id, stage);
        let status = TaskSequencer::stage_status(&tasks);
        let (cycles, approval, available_builds) = if stage == Stage::Regression {
            (
                Some(self.store.cycles_for_release(release_id)),
                Some(self.cycles.evaluate_approval(&release).await),
                Some(self.ledger.available(release_id, stage)),
            )
        } else {
            (None, None, None)
        };
        Ok(StageOverview {
            stage,
            status,
            tasks,
            cycles,
            approval,
            available_builds,
        })
    }

    /// Reset a failed task to PENDING for re-dispatch. Idempotent: retrying
    /// an already-PENDING task is a no-op. Tasks that completed with success
    /// or are still in flight cannot be retried.
    pub fn retry_task(&self, release_id: Uuid, task_id: Uuid) -> Result<ReleaseTask> {
        let task = self.store.get_task(task_id)?;
        if task.release_id != release_id {
            return Err(EngineError::not_found(format!(
                "task {task_id} in release {release_id}"
            )));
        }
        match (task.status, task.conclusion) {
            (TaskStatus::Pending, _) => Ok(task),
            (TaskStatus::Failed, _) | (TaskStatus::Completed, Some(TaskConclusion::Failure)) => {
                self.store.transition_task(
                    task_id,
                    &[TaskStatus::Failed, TaskStatus::Completed],
                    TaskStatus::Pending,
                    |t| {
                        t.conclusion = None;
                        if let serde_json::Value::Object(map) = &mut t.external_data {
                            map.remove("error");
                        }
                    },
                )
            }
            _ => Err(EngineError::conflict(format!(
                "task {task_id} is {} and cannot be retried",
                task.status
            ))),
        }
    }

    // ---- build upload surface ----

    pub fn stage_build_file(
        &self,
        release_id: Uuid,
        stage: Stage,
        platform: Platform,
        artifact_path: String,
    ) -> Result<StagedBuild> {
        let release = self.store.get_release(release_id)?;
        if !release.targets(platform) {
            return Err(EngineError::validation(format!(
                "release {release_id} does not target platform {platform}"
            )));
        }
        let upload = self
            .ledger
            .stage_file(&release, stage, platform, artifact_path)?;
        Ok(self.staged(&release, stage, upload))
    }

    pub fn stage_testflight_build(
        &self,
        release_id: Uuid,
        stage: Stage,
        build_number: String,
    ) -> Result<StagedBuild> {
        let release = self.store.get_release(release_id)?;
        if !release.targets(Platform::Ios) {
            return Err(EngineError::validation(format!(
                "release {release_id} does not target ios"
            )));
        }
        if build_number.is_empty() {
            return Err(EngineError::validation("build number must be non-empty"));
        }
        let upload = self
            .ledger
            .stage_testflight_build(&release, stage, build_number)?;
        Ok(self.staged(&release, stage, upload))
    }

    fn staged(&self, release: &Release, stage: Stage, upload: BuildUpload) -> StagedBuild {
        let UploadReadiness {
            all_ready,
            missing_platforms,
        } = self.ledger.readiness(release, stage);
        StagedBuild {
            upload_id: upload.id,
            all_ready,
            missing_platforms,
        }
    }

    pub fn delete_upload(&self, upload_id: Uuid) -> Result<()> {
        self.ledger.delete(upload_id)
    }

    // ---- approval surface ----

    pub async fn evaluate_approval(&self, release_id: Uuid) -> Result<ApprovalStatus> {
        let release = self.store.get_release(release_id)?;
        Ok(self.cycles.evaluate_approval(&release).await)
    }

    pub async fn approve_regression(&self, release_id: Uuid) -> Result<ApprovalStatus> {
        let release = self.store.get_release(release_id)?;
        self.cycles.approve(&release).await
    }

    // ---- cron surface ----

    pub async fn poll_pending_workflows(
        &self,
        release_id: Uuid,
        app_id: &str,
    ) -> Result<PollReport> {
        let release = self.get_release_for_app(release_id, app_id)?;
        Ok(self.polling.poll_pending(&release).await)
    }

    pub async fn poll_running_workflows(
        &self,
        release_id: Uuid,
        app_id: &str,
    ) -> Result<PollReport> {
        let release = self.get_release_for_app(release_id, app_id)?;
        Ok(self.polling.poll_running(&release).await)
    }

    /// One scheduler tick over all active releases.
    pub async fn run_tick(&self) -> TickSummary {
        self.scheduler.run_tick().await
    }

    /// Seed the current stage's tasks without running a full tick; used by
    /// the task surface so a freshly registered release shows its kickoff
    /// task set immediately.
    pub fn seed_current_stage(&self, release_id: Uuid) -> Result<Vec<ReleaseTask>> {
        let release = self.store.get_release(release_id)?;
        match release.phase.as_stage() {
            Some(stage) => Ok(self.sequencer.seed_stage(&release, stage)),
            None => Ok(vec![]),
        }
    }
}
