//! # Release Task Model
//!
//! One orchestrated unit of work within a stage, mapped to a single provider
//! adapter call. Task identity is fixed at creation by the sequencer, keyed
//! by `(release, stage, type, platform)`; rows are never deleted, only
//! transitioned, so the task list is an append-only audit trail of the
//! release's execution history. A manual retry resets the same row back to
//! PENDING rather than creating a new one.

use crate::models::release::{Platform, Stage};
use crate::state_machine::{TaskConclusion, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The kind of work a task performs, determining which provider adapter the
/// executor dispatches it to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Fork the release branch from the base branch (SCM, sync).
    ForkBranch,
    /// Create the release tracking ticket (project management, sync).
    CreateTicket,
    /// Announce kickoff in chat (notifier, sync).
    NotifyKickoff,
    /// Trigger a per-platform CI build workflow (CI/CD, async).
    TriggerPlatformBuild,
    /// Open a regression cycle, cutting its tag and consuming builds (sync).
    CreateRegressionCycle,
    /// Create a per-platform test run on the test platform (async).
    CreateTestRun,
    /// Generate release notes between base branch and release branch (sync).
    GenerateReleaseNotes,
    /// Cut the final release tag (SCM, sync, idempotent by ref existence).
    CreateReleaseTag,
    /// Announce the cut release in chat (notifier, sync).
    NotifyRelease,
}

impl TaskType {
    /// Whether the provider call only starts external work, completing later
    /// via the polling service.
    pub fn is_async(&self) -> bool {
        matches!(self, Self::TriggerPlatformBuild | Self::CreateTestRun)
    }

    /// Whether this task is instantiated once per targeted platform.
    pub fn is_per_platform(&self) -> bool {
        matches!(self, Self::TriggerPlatformBuild | Self::CreateTestRun)
    }

    /// Create operations for which an already-existing external ref is a
    /// success, not an error.
    pub fn is_idempotent_create(&self) -> bool {
        matches!(self, Self::CreateReleaseTag | Self::CreateRegressionCycle)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ForkBranch => "fork_branch",
            Self::CreateTicket => "create_ticket",
            Self::NotifyKickoff => "notify_kickoff",
            Self::TriggerPlatformBuild => "trigger_platform_build",
            Self::CreateRegressionCycle => "create_regression_cycle",
            Self::CreateTestRun => "create_test_run",
            Self::GenerateReleaseNotes => "generate_release_notes",
            Self::CreateReleaseTag => "create_release_tag",
            Self::NotifyRelease => "notify_release",
        };
        write!(f, "{s}")
    }
}

/// Stable identity of a task within a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskKey {
    pub stage: Stage,
    pub task_type: TaskType,
    pub platform: Option<Platform>,
}

impl TaskKey {
    pub fn new(stage: Stage, task_type: TaskType, platform: Option<Platform>) -> Self {
        Self {
            stage,
            task_type,
            platform,
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.platform {
            Some(p) => write!(f, "{}/{}[{}]", self.stage, self.task_type, p),
            None => write!(f, "{}/{}", self.stage, self.task_type),
        }
    }
}

/// A task row. `external_id` holds the provider's job/run identifier for
/// asynchronous work; `external_data` carries provider payloads and, on
/// failure, the recorded error under the `error` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseTask {
    pub id: Uuid,
    pub release_id: Uuid,
    pub stage: Stage,
    pub task_type: TaskType,
    pub platform: Option<Platform>,
    pub status: TaskStatus,
    pub conclusion: Option<TaskConclusion>,
    pub depends_on: Vec<Uuid>,
    pub external_id: Option<String>,
    pub external_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReleaseTask {
    pub fn new(
        release_id: Uuid,
        stage: Stage,
        task_type: TaskType,
        platform: Option<Platform>,
        depends_on: Vec<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            release_id,
            stage,
            task_type,
            platform,
            status: TaskStatus::default(),
            conclusion: None,
            depends_on,
            external_id: None,
            external_data: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> TaskKey {
        TaskKey::new(self.stage, self.task_type, self.platform)
    }

    pub fn succeeded(&self) -> bool {
        self.status == TaskStatus::Completed && self.conclusion == Some(TaskConclusion::Success)
    }

    /// Record an error message in `external_data.error`, preserving any
    /// other payload fields already stored there.
    pub fn record_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        match &mut self.external_data {
            serde_json::Value::Object(map) => {
                map.insert("error".to_string(), serde_json::Value::String(message));
            }
            _ => {
                self.external_data = serde_json::json!({ "error": message });
            }
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.external_data.get("error").and_then(|v| v.as_str())
    }
}
