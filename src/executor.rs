//! # Task Executor
//!
//! Dispatches one eligible task to its provider adapter. Two outcomes:
//!
//! - **Synchronous**: the adapter returns a definitive result inline (fork
//!   branch, create ticket, cut tag, send message, open a cycle) and the task
//!   transitions straight to COMPLETED or FAILED.
//! - **Asynchronous**: the adapter only *starts* external work (trigger a CI
//!   workflow, create a test run); the task transitions to AWAITING_CALLBACK
//!   with the provider's run id, and completion is detected by the polling
//!   service on later ticks, never here.
//!
//! The executor never blocks waiting for external work. A Conflict from an
//! idempotent create (tag ref already exists) is a success, not an error;
//! every other failure lands on the task as FAILED with the error recorded in
//! `external_data.error`, eligible for manual retry.

use crate::cycles::RegressionCycleManager;
use crate::error::{EngineError, Result};
use crate::models::{CycleStatus, Platform, Release, ReleaseTask, TaskType};
use crate::providers::{ProviderSet, TestRunRequest, WorkflowTrigger};
use crate::state_machine::{TaskConclusion, TaskStatus};
use crate::store::EngineStore;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result of one provider call, before it is folded into the task row.
enum DispatchOutcome {
    Sync { data: serde_json::Value },
    Async { external_id: String, data: serde_json::Value },
}

#[derive(Clone)]
pub struct TaskExecutor {
    store: Arc<EngineStore>,
    providers: ProviderSet,
    cycles: RegressionCycleManager,
    notification_channel: String,
}

impl TaskExecutor {
    pub fn new(
        store: Arc<EngineStore>,
        providers: ProviderSet,
        cycles: RegressionCycleManager,
        notification_channel: String,
    ) -> Self {
        Self {
            store,
            providers,
            cycles,
            notification_channel,
        }
    }

    /// Dispatch one task. Returns the task as persisted after the dispatch;
    /// a Conflict on the final conditional update means another scheduler
    /// instance got there first and this dispatch's write was discarded.
    pub async fn dispatch(&self, release: &Release, task: &ReleaseTask) -> Result<ReleaseTask> {
        info!(
            release_id = %release.id,
            task_id = %task.id,
            task = %task.key(),
            "dispatching task"
        );
        match self.call_provider(release, task).await {
            Ok(DispatchOutcome::Sync { data }) => self.store.transition_task(
                task.id,
                &[TaskStatus::Pending],
                TaskStatus::Completed,
                |t| {
                    t.conclusion = Some(TaskConclusion::Success);
                    t.external_data = data;
                },
            ),
            Ok(DispatchOutcome::Async { external_id, data }) => self.store.transition_task(
                task.id,
                &[TaskStatus::Pending],
                TaskStatus::AwaitingCallback,
                |t| {
                    t.external_id = Some(external_id);
                    t.external_data = data;
                },
            ),
            Err(e) if e.is_conflict() && task.task_type.is_idempotent_create() => {
                // The external ref already exists; the create is satisfied.
                warn!(task_id = %task.id, error = %e, "idempotent create hit existing ref");
                self.store.transition_task(
                    task.id,
                    &[TaskStatus::Pending],
                    TaskStatus::Completed,
                    |t| {
                        t.conclusion = Some(TaskConclusion::Success);
                        t.external_data = json!({ "note": "already existed" });
                    },
                )
            }
            Err(e) => {
                error!(
                    release_id = %release.id,
                    task_id = %task.id,
                    task = %task.key(),
                    error = %e,
                    "task dispatch failed"
                );
                let message = e.to_string();
                self.store.transition_task(
                    task.id,
                    &[TaskStatus::Pending],
                    TaskStatus::Failed,
                    |t| {
                        t.conclusion = Some(TaskConclusion::Failure);
                        t.record_error(message);
                    },
                )
            }
        }
    }

    async fn call_provider(
        &self,
        release: &Release,
        task: &ReleaseTask,
    ) -> Result<DispatchOutcome> {
        match task.task_type {
            TaskType::ForkBranch => self.fork_branch(release).await,
            TaskType::CreateTicket => self.create_ticket(release).await,
            TaskType::NotifyKickoff => {
                let text = format!(
                    "Release {} kicked off: branch `{}` forked from `{}`",
                    release.version, release.branch, release.base_branch
                );
                self.notify(&text).await
            }
            TaskType::TriggerPlatformBuild => {
                let platform = self.required_platform(task)?;
                self.trigger_build(release, platform).await
            }
            TaskType::CreateRegressionCycle => {
                let cycle = self.cycles.start_cycle(release, Some(task.id)).await?;
                Ok(DispatchOutcome::Sync {
                    data: json!({ "cycle_id": cycle.id, "tag": cycle.tag }),
                })
            }
            TaskType::CreateTestRun => {
                let platform = self.required_platform(task)?;
                self.create_test_run(release, task, platform).await
            }
            TaskType::GenerateReleaseNotes => {
                let notes = self
                    .providers
                    .scm
                    .generate_release_notes(&release.repo, &release.base_branch, &release.branch)
                    .await?;
                Ok(DispatchOutcome::Sync {
                    data: json!({ "notes": notes }),
                })
            }
            TaskType::CreateReleaseTag => {
                let head = self
                    .providers
                    .scm
                    .branch_head(&release.repo, &release.branch)
                    .await?;
                let tag = self
                    .providers
                    .scm
                    .create_tag(&release.repo, &release.release_tag(), &head)
                    .await?;
                Ok(DispatchOutcome::Sync {
                    data: json!({ "tag": tag, "sha": head }),
                })
            }
            TaskType::NotifyRelease => {
                let text = format!(
                    "Release {} cut: tag `{}` on `{}`",
                    release.version,
                    release.release_tag(),
                    release.branch
                );
                self.notify(&text).await
            }
        }
    }

    async fn fork_branch(&self, release: &Release) -> Result<DispatchOutcome> {
        // Re-running after a crash: an existing release branch is this
        // operation already done, not an error.
        if self
            .providers
            .scm
            .branch_exists(&release.repo, &release.branch)
            .await?
        {
            return Ok(DispatchOutcome::Sync {
                data: json!({ "branch": release.branch, "note": "already existed" }),
            });
        }
        let head = self
            .providers
            .scm
            .fork_branch(&release.repo, &release.base_branch, &release.branch)
            .await?;
        Ok(DispatchOutcome::Sync {
            data: json!({ "branch": release.branch, "head_sha": head }),
        })
    }

    async fn create_ticket(&self, release: &Release) -> Result<DispatchOutcome> {
        let summary = format!("Release {} ({})", release.version, release.app_id);
        let description = format!(
            "Tracking ticket for release {} on branch {} targeting {}",
            release.version,
            release.branch,
            release.target_release_at.date_naive()
        );
        let key = self
            .providers
            .tickets
            .create_ticket(&summary, &description)
            .await?;
        Ok(DispatchOutcome::Sync {
            data: json!({ "ticket": key }),
        })
    }

    async fn notify(&self, text: &str) -> Result<DispatchOutcome> {
        self.providers
            .notifier
            .send_message(&self.notification_channel, text)
            .await?;
        Ok(DispatchOutcome::Sync {
            data: json!({ "channel": self.notification_channel, "text": text }),
        })
    }

    async fn trigger_build(
        &self,
        release: &Release,
        platform: Platform,
    ) -> Result<DispatchOutcome> {
        let trigger = WorkflowTrigger {
            repo: release.repo.clone(),
            branch: release.branch.clone(),
            platform,
            inputs: json!({ "version": release.version }),
        };
        let run_id = self.providers.ci.trigger_workflow(&trigger).await?;
        Ok(DispatchOutcome::Async {
            external_id: run_id,
            data: json!({ "platform": platform, "branch": release.branch }),
        })
    }

    async fn create_test_run(
        &self,
        release: &Release,
        task: &ReleaseTask,
        platform: Platform,
    ) -> Result<DispatchOutcome> {
        // A re-armed task still carries the run id from the previous cycle;
        // reset that run instead of creating a duplicate.
        if let Some(run_id) = &task.external_id {
            self.providers.tests.reset_test_run(run_id).await?;
            return Ok(DispatchOutcome::Async {
                external_id: run_id.clone(),
                data: json!({ "platform": platform, "note": "reset for new cycle" }),
            });
        }
        let build_ref = self
            .store
            .cycles_for_release(release.id)
            .into_iter()
            .filter(|c| c.status != CycleStatus::Abandoned)
            .last()
            .and_then(|c| c.tag)
            .unwrap_or_else(|| release.branch.clone());
        let request = TestRunRequest {
            name: format!("{} regression ({platform})", release.version),
            platform,
            build_ref,
        };
        let run_id = self.providers.tests.create_test_run(&request).await?;
        Ok(DispatchOutcome::Async {
            external_id: run_id,
            data: json!({ "platform": platform }),
        })
    }

    fn required_platform(&self, task: &ReleaseTask) -> Result<Platform> {
        task.platform.ok_or_else(|| {
            EngineError::validation(format!(
                "task {} of type {} must carry a platform",
                task.id, task.task_type
            ))
        })
    }
}
