//! # Workflow Polling Service
//!
//! The two pull-based reconciliation passes that translate externally
//! progressing work into task-state transitions. No webhooks exist; these
//! run every tick and are pure state reconciliation — running either pass
//! twice with no underlying change is a no-op, because terminal tasks drop
//! out of the scanned set and every write is a guarded conditional update.
//!
//! - **poll pending**: AWAITING_CALLBACK tasks whose external job has
//!   *started* move to IN_PROGRESS, surfacing "build is running" without
//!   waiting for completion.
//! - **poll running**: in-flight tasks whose external job reached a terminal
//!   state move to COMPLETED, with the conclusion derived from the provider's
//!   pass/fail signal; test runs additionally compare their pass percentage
//!   against the configured threshold.
//!
//! A provider read failing mid-poll never fails the task: the task stays
//! in flight and the error is surfaced in the poll report.

use crate::models::{Platform, Release, ReleaseTask, TaskType};
use crate::providers::{ProviderSet, TestRunState, WorkflowConclusion, WorkflowState};
use crate::state_machine::{TaskConclusion, TaskStatus};
use crate::store::EngineStore;
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One observed task transition, reported back through the cron endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReconciliation {
    pub task_id: Uuid,
    pub task_type: TaskType,
    pub platform: Option<Platform>,
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub conclusion: Option<TaskConclusion>,
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollReport {
    pub checked: usize,
    pub transitions: Vec<TaskReconciliation>,
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct WorkflowPollingService {
    store: Arc<EngineStore>,
    providers: ProviderSet,
    test_pass_threshold: f64,
}

impl WorkflowPollingService {
    pub fn new(store: Arc<EngineStore>, providers: ProviderSet, test_pass_threshold: f64) -> Self {
        Self {
            store,
            providers,
            test_pass_threshold,
        }
    }

    fn in_flight(
        &self,
        release: &Release,
        statuses: &[TaskStatus],
        among: Option<&HashSet<Uuid>>,
    ) -> Vec<ReleaseTask> {
        self.store
            .tasks_for_release(release.id)
            .into_iter()
            .filter(|t| statuses.contains(&t.status) && t.external_id.is_some())
            .filter(|t| among.map_or(true, |set| set.contains(&t.id)))
            .collect()
    }

    /// AWAITING_CALLBACK → IN_PROGRESS for jobs observed running.
    pub async fn poll_pending(&self, release: &Release) -> PollReport {
        self.poll_pending_among(release, None).await
    }

    /// Same pass, restricted to a pre-captured task set. The scheduler uses
    /// this so a task dispatched within the current tick is only polled on
    /// the next one.
    pub async fn poll_pending_among(
        &self,
        release: &Release,
        among: Option<&HashSet<Uuid>>,
    ) -> PollReport {
        let mut report = PollReport::default();
        for task in self.in_flight(release, &[TaskStatus::AwaitingCallback], among) {
            report.checked += 1;
            let external_id = task.external_id.clone().unwrap_or_default();
            let started = match task.task_type {
                TaskType::TriggerPlatformBuild => {
                    match self.providers.ci.get_workflow_status(&external_id).await {
                        Ok(status) => status.state == WorkflowState::Running,
                        Err(e) => {
                            report.errors.push(format!("task {}: {e}", task.id));
                            continue;
                        }
                    }
                }
                TaskType::CreateTestRun => {
                    match self.providers.tests.get_test_status(&external_id).await {
                        Ok(status) => status.state == TestRunState::InProgress && status.has_started(),
                        Err(e) => {
                            report.errors.push(format!("task {}: {e}", task.id));
                            continue;
                        }
                    }
                }
                _ => false,
            };
            if !started {
                continue;
            }
            match self.store.transition_task(
                task.id,
                &[TaskStatus::AwaitingCallback],
                TaskStatus::InProgress,
                |_| {},
            ) {
                Ok(updated) => {
                    debug!(task_id = %task.id, "external job observed running");
                    report.transitions.push(TaskReconciliation {
                        task_id: task.id,
                        task_type: task.task_type,
                        platform: task.platform,
                        from: TaskStatus::AwaitingCallback,
                        to: updated.status,
                        conclusion: updated.conclusion,
                    });
                }
                // Lost the write to a concurrent reconciler; its result stands.
                Err(e) => report.errors.push(format!("task {}: {e}", task.id)),
            }
        }
        report
    }

    /// In-flight tasks whose external job finished → COMPLETED with the
    /// provider-derived conclusion.
    pub async fn poll_running(&self, release: &Release) -> PollReport {
        self.poll_running_among(release, None).await
    }

    pub async fn poll_running_among(
        &self,
        release: &Release,
        among: Option<&HashSet<Uuid>>,
    ) -> PollReport {
        let mut report = PollReport::default();
        let in_flight = self.in_flight(
            release,
            &[TaskStatus::AwaitingCallback, TaskStatus::InProgress],
            among,
        );
        for task in in_flight {
            report.checked += 1;
            match task.task_type {
                TaskType::TriggerPlatformBuild => {
                    self.reconcile_workflow(&task, &mut report).await;
                }
                TaskType::CreateTestRun => {
                    self.reconcile_test_run(&task, &mut report).await;
                }
                _ => {}
            }
        }
        if !report.transitions.is_empty() {
            info!(
                release_id = %release.id,
                transitions = report.transitions.len(),
                "poll-running reconciled tasks"
            );
        }
        report
    }

    async fn reconcile_workflow(&self, task: &ReleaseTask, report: &mut PollReport) {
        let external_id = task.external_id.clone().unwrap_or_default();
        let status = match self.providers.ci.get_workflow_status(&external_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "workflow status read failed");
                report.errors.push(format!("task {}: {e}", task.id));
                return;
            }
        };
        if status.state != WorkflowState::Completed {
            return;
        }
        let conclusion = match status.conclusion {
            Some(WorkflowConclusion::Success) => TaskConclusion::Success,
            // A missing conclusion on a completed run is a provider
            // execution error; record it distinctly.
            _ => TaskConclusion::Failure,
        };
        let from = task.status;
        let result = self.store.transition_task(
            task.id,
            &[TaskStatus::AwaitingCallback, TaskStatus::InProgress],
            TaskStatus::Completed,
            |t| {
                t.conclusion = Some(conclusion);
                if conclusion == TaskConclusion::Failure {
                    t.record_error("workflow run concluded with failure");
                }
            },
        );
        match result {
            Ok(updated) => report.transitions.push(TaskReconciliation {
                task_id: task.id,
                task_type: task.task_type,
                platform: task.platform,
                from,
                to: updated.status,
                conclusion: updated.conclusion,
            }),
            Err(e) => report.errors.push(format!("task {}: {e}", task.id)),
        }
    }

    async fn reconcile_test_run(&self, task: &ReleaseTask, report: &mut PollReport) {
        let external_id = task.external_id.clone().unwrap_or_default();
        let status = match self.providers.tests.get_test_status(&external_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "test run status read failed");
                report.errors.push(format!("task {}: {e}", task.id));
                return;
            }
        };
        if status.state == TestRunState::Errored {
            let from = task.status;
            let result = self.store.transition_task(
                task.id,
                &[TaskStatus::AwaitingCallback, TaskStatus::InProgress],
                TaskStatus::Completed,
                |t| {
                    t.conclusion = Some(TaskConclusion::Failure);
                    t.record_error("test run errored on the test platform");
                },
            );
            match result {
                Ok(updated) => report.transitions.push(TaskReconciliation {
                    task_id: task.id,
                    task_type: task.task_type,
                    platform: task.platform,
                    from,
                    to: updated.status,
                    conclusion: updated.conclusion,
                }),
                Err(e) => report.errors.push(format!("task {}: {e}", task.id)),
            }
            return;
        }
        if status.state != TestRunState::Completed {
            return;
        }
        let pass_percentage = status.pass_percentage();
        let threshold = self.test_pass_threshold;
        let passed = pass_percentage >= threshold;
        let from = task.status;
        let result = self.store.transition_task(
            task.id,
            &[TaskStatus::AwaitingCallback, TaskStatus::InProgress],
            TaskStatus::Completed,
            |t| {
                t.conclusion = Some(if passed {
                    TaskConclusion::Success
                } else {
                    TaskConclusion::Failure
                });
                t.external_data = json!({
                    "pass_percentage": pass_percentage,
                    "threshold": threshold,
                    "passed": status.passed,
                    "failed": status.failed,
                    "untested": status.untested,
                });
                if !passed {
                    t.record_error("pass threshold not met");
                }
            },
        );
        match result {
            Ok(updated) => report.transitions.push(TaskReconciliation {
                task_id: task.id,
                task_type: task.task_type,
                platform: task.platform,
                from,
                to: updated.status,
                conclusion: updated.conclusion,
            }),
            Err(e) => report.errors.push(format!("task {}: {e}", task.id)),
        }
    }
}
