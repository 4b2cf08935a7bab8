//! # Provider Adapters
//!
//! Abstract capability contracts for the external systems the engine
//! orchestrates: source control, CI/CD, test management, project management
//! and chat notification. Concrete HTTP clients live outside the engine;
//! everything here is a narrow `async_trait` seam returning [`EngineError`]
//! so the executor and polling layers can classify outcomes uniformly.
//!
//! All completion detection is pull-based: asynchronous operations return a
//! provider job/run identifier and are observed later through the status
//! queries, never through callbacks.

use crate::error::Result;
use crate::models::Platform;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What a git ref or tag object points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GitObjectKind {
    Commit,
    Tag,
}

/// Target of a resolved ref: a SHA plus what kind of object it names.
/// An annotated tag ref points at a tag object, which must be dereferenced
/// again to reach the underlying commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefTarget {
    pub sha: String,
    pub kind: GitObjectKind,
}

/// Result of comparing two commits.
#[derive(Debug, Clone, Serialize)]
pub struct CommitComparison {
    pub ahead_by: u64,
    pub behind_by: u64,
}

#[async_trait]
pub trait ScmProvider: Send + Sync {
    async fn branch_exists(&self, repo: &str, branch: &str) -> Result<bool>;

    /// Fork `new_branch` from the head of `base`. Returns the new head SHA.
    async fn fork_branch(&self, repo: &str, base: &str, new_branch: &str) -> Result<String>;

    /// Create `tag` pointing at `sha`. An already-existing ref surfaces as
    /// [`EngineError::Conflict`], which callers treat as success for this
    /// idempotent create.
    async fn create_tag(&self, repo: &str, tag: &str, sha: &str) -> Result<String>;

    async fn generate_release_notes(&self, repo: &str, base: &str, head: &str) -> Result<String>;

    async fn compare_commits(&self, repo: &str, base: &str, head: &str)
        -> Result<CommitComparison>;

    /// Current head commit SHA of a branch.
    async fn branch_head(&self, repo: &str, branch: &str) -> Result<String>;

    /// Resolve a fully qualified ref (e.g. `tags/v1.2.0`) to its target.
    async fn get_ref(&self, repo: &str, reference: &str) -> Result<RefTarget>;

    /// Dereference an annotated tag object by SHA.
    async fn get_tag_object(&self, repo: &str, sha: &str) -> Result<RefTarget>;
}

/// State of an externally running CI workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Queued,
    Running,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowConclusion {
    Success,
    Failure,
}

#[derive(Debug, Clone)]
pub struct WorkflowRunStatus {
    pub state: WorkflowState,
    pub conclusion: Option<WorkflowConclusion>,
}

/// Parameters for triggering a CI build workflow.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowTrigger {
    pub repo: String,
    pub branch: String,
    pub platform: Platform,
    pub inputs: serde_json::Value,
}

#[async_trait]
pub trait CiProvider: Send + Sync {
    /// Start a workflow; returns the provider's run id immediately.
    async fn trigger_workflow(&self, trigger: &WorkflowTrigger) -> Result<String>;

    async fn get_workflow_status(&self, run_id: &str) -> Result<WorkflowRunStatus>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestRunState {
    InProgress,
    Completed,
    /// The run crashed provider-side before producing results. Terminal;
    /// the counts carry whatever executed before the crash.
    Errored,
}

/// Progress of a test run on the test platform.
#[derive(Debug, Clone)]
pub struct TestRunStatus {
    pub state: TestRunState,
    pub passed: u64,
    pub failed: u64,
    pub untested: u64,
}

impl TestRunStatus {
    pub fn total(&self) -> u64 {
        self.passed + self.failed + self.untested
    }

    /// Percentage of executed-and-passed tests over the whole run. An empty
    /// run scores zero so it can never clear a positive threshold.
    pub fn pass_percentage(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.passed as f64 * 100.0 / total as f64
    }

    /// Whether any test has executed yet; used to surface "run is underway"
    /// before completion.
    pub fn has_started(&self) -> bool {
        self.passed + self.failed > 0
    }
}

/// Parameters for creating a per-platform test run.
#[derive(Debug, Clone, Serialize)]
pub struct TestRunRequest {
    pub name: String,
    pub platform: Platform,
    /// Build the run verifies: artifact ref or TestFlight build number.
    pub build_ref: String,
}

#[async_trait]
pub trait TestProvider: Send + Sync {
    /// Create a test run; returns the provider's run id immediately.
    async fn create_test_run(&self, request: &TestRunRequest) -> Result<String>;

    async fn get_test_status(&self, run_id: &str) -> Result<TestRunStatus>;

    async fn reset_test_run(&self, run_id: &str) -> Result<()>;

    async fn cancel_test_run(&self, run_id: &str) -> Result<()>;
}

#[async_trait]
pub trait TicketProvider: Send + Sync {
    /// Create a tracking ticket; returns the ticket key.
    async fn create_ticket(&self, summary: &str, description: &str) -> Result<String>;

    async fn get_ticket_status(&self, ticket_key: &str) -> Result<String>;
}

#[async_trait]
pub trait NotifierProvider: Send + Sync {
    async fn send_message(&self, channel: &str, text: &str) -> Result<()>;
}

/// Bundle of the five adapters, wired by the host and shared across the
/// engine's services.
#[derive(Clone)]
pub struct ProviderSet {
    pub scm: Arc<dyn ScmProvider>,
    pub ci: Arc<dyn CiProvider>,
    pub tests: Arc<dyn TestProvider>,
    pub tickets: Arc<dyn TicketProvider>,
    pub notifier: Arc<dyn NotifierProvider>,
}
