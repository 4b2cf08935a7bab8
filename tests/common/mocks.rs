//! In-memory provider doubles with externally controllable state.
//!
//! Each mock records what the engine asked of it and lets a test script the
//! external side of the conversation: advance a CI run to completed, post
//! test results, move a branch head, pre-create a tag.

use async_trait::async_trait;
use liftoff_core::error::{EngineError, Result};
use liftoff_core::providers::{
    CiProvider, CommitComparison, GitObjectKind, NotifierProvider, ProviderSet, RefTarget,
    ScmProvider, TestProvider, TestRunRequest, TestRunState, TestRunStatus, TicketProvider,
    WorkflowConclusion, WorkflowRunStatus, WorkflowState, WorkflowTrigger,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct MockScm {
    /// branch name -> head commit SHA
    pub branches: Mutex<HashMap<String, String>>,
    /// fully qualified ref (e.g. "tags/v1.2.0-rc.1") -> target
    pub refs: Mutex<HashMap<String, RefTarget>>,
    /// tag object SHA -> what it dereferences to
    pub objects: Mutex<HashMap<String, RefTarget>>,
    /// When set, every read fails with a transient error.
    pub fail_reads: Mutex<bool>,
    forks: AtomicU64,
}

impl MockScm {
    pub fn with_branch(branch: &str, head: &str) -> Self {
        let scm = Self::default();
        scm.set_branch_head(branch, head);
        scm
    }

    pub fn set_branch_head(&self, branch: &str, head: &str) {
        self.branches
            .lock()
            .insert(branch.to_string(), head.to_string());
    }

    pub fn set_ref(&self, reference: &str, sha: &str, kind: GitObjectKind) {
        self.refs.lock().insert(
            reference.to_string(),
            RefTarget {
                sha: sha.to_string(),
                kind,
            },
        );
    }

    pub fn set_tag_object(&self, sha: &str, target_sha: &str, kind: GitObjectKind) {
        self.objects.lock().insert(
            sha.to_string(),
            RefTarget {
                sha: target_sha.to_string(),
                kind,
            },
        );
    }

    fn check_reads(&self) -> Result<()> {
        if *self.fail_reads.lock() {
            return Err(EngineError::transient("scm unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ScmProvider for MockScm {
    async fn branch_exists(&self, _repo: &str, branch: &str) -> Result<bool> {
        self.check_reads()?;
        Ok(self.branches.lock().contains_key(branch))
    }

    async fn fork_branch(&self, _repo: &str, base: &str, new_branch: &str) -> Result<String> {
        let head = self
            .branches
            .lock()
            .get(base)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("branch {base}")))?;
        let sha = format!("{head}-fork-{}", self.forks.fetch_add(1, Ordering::SeqCst));
        self.set_branch_head(new_branch, &sha);
        Ok(sha)
    }

    async fn create_tag(&self, _repo: &str, tag: &str, sha: &str) -> Result<String> {
        let mut refs = self.refs.lock();
        let reference = format!("tags/{tag}");
        if refs.contains_key(&reference) {
            return Err(EngineError::conflict(format!("ref {reference} exists")));
        }
        refs.insert(
            reference,
            RefTarget {
                sha: sha.to_string(),
                kind: GitObjectKind::Commit,
            },
        );
        Ok(tag.to_string())
    }

    async fn generate_release_notes(&self, _repo: &str, base: &str, head: &str) -> Result<String> {
        Ok(format!("changes from {base} to {head}"))
    }

    async fn compare_commits(
        &self,
        _repo: &str,
        _base: &str,
        _head: &str,
    ) -> Result<CommitComparison> {
        Ok(CommitComparison {
            ahead_by: 0,
            behind_by: 0,
        })
    }

    async fn branch_head(&self, _repo: &str, branch: &str) -> Result<String> {
        self.check_reads()?;
        self.branches
            .lock()
            .get(branch)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("branch {branch}")))
    }

    async fn get_ref(&self, _repo: &str, reference: &str) -> Result<RefTarget> {
        self.check_reads()?;
        self.refs
            .lock()
            .get(reference)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("ref {reference}")))
    }

    async fn get_tag_object(&self, _repo: &str, sha: &str) -> Result<RefTarget> {
        self.check_reads()?;
        self.objects
            .lock()
            .get(sha)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("tag object {sha}")))
    }
}

#[derive(Default)]
pub struct MockCi {
    pub runs: Mutex<HashMap<String, WorkflowRunStatus>>,
    pub triggers: Mutex<Vec<WorkflowTrigger>>,
    pub fail_reads: Mutex<bool>,
    /// When set, a triggered run reports completed-successful immediately.
    pub complete_immediately: Mutex<bool>,
    counter: AtomicU64,
}

impl MockCi {
    pub fn set_run(&self, run_id: &str, state: WorkflowState, conclusion: Option<WorkflowConclusion>) {
        self.runs
            .lock()
            .insert(run_id.to_string(), WorkflowRunStatus { state, conclusion });
    }

    pub fn run_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.runs.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl CiProvider for MockCi {
    async fn trigger_workflow(&self, trigger: &WorkflowTrigger) -> Result<String> {
        let run_id = format!("ci-run-{}", self.counter.fetch_add(1, Ordering::SeqCst));
        self.triggers.lock().push(trigger.clone());
        if *self.complete_immediately.lock() {
            self.set_run(
                &run_id,
                WorkflowState::Completed,
                Some(WorkflowConclusion::Success),
            );
        } else {
            self.set_run(&run_id, WorkflowState::Queued, None);
        }
        Ok(run_id)
    }

    async fn get_workflow_status(&self, run_id: &str) -> Result<WorkflowRunStatus> {
        if *self.fail_reads.lock() {
            return Err(EngineError::transient("ci unavailable"));
        }
        self.runs
            .lock()
            .get(run_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("workflow run {run_id}")))
    }
}

#[derive(Default)]
pub struct MockTestPlatform {
    pub runs: Mutex<HashMap<String, TestRunStatus>>,
    pub requests: Mutex<Vec<TestRunRequest>>,
    pub resets: Mutex<Vec<String>>,
    pub fail_reads: Mutex<bool>,
    counter: AtomicU64,
}

impl MockTestPlatform {
    pub fn post_results(&self, run_id: &str, passed: u64, failed: u64, untested: u64) {
        self.runs.lock().insert(
            run_id.to_string(),
            TestRunStatus {
                state: TestRunState::Completed,
                passed,
                failed,
                untested,
            },
        );
    }

    /// The run crashed provider-side before finishing.
    pub fn post_error(&self, run_id: &str) {
        self.runs.lock().insert(
            run_id.to_string(),
            TestRunStatus {
                state: TestRunState::Errored,
                passed: 0,
                failed: 0,
                untested: 0,
            },
        );
    }

    pub fn mark_started(&self, run_id: &str, passed: u64, failed: u64) {
        self.runs.lock().insert(
            run_id.to_string(),
            TestRunStatus {
                state: TestRunState::InProgress,
                passed,
                failed,
                untested: 0,
            },
        );
    }

    pub fn run_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.runs.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl TestProvider for MockTestPlatform {
    async fn create_test_run(&self, request: &TestRunRequest) -> Result<String> {
        let run_id = format!("test-run-{}", self.counter.fetch_add(1, Ordering::SeqCst));
        self.requests.lock().push(request.clone());
        self.runs.lock().insert(
            run_id.clone(),
            TestRunStatus {
                state: TestRunState::InProgress,
                passed: 0,
                failed: 0,
                untested: 0,
            },
        );
        Ok(run_id)
    }

    async fn get_test_status(&self, run_id: &str) -> Result<TestRunStatus> {
        if *self.fail_reads.lock() {
            return Err(EngineError::transient("test platform unavailable"));
        }
        self.runs
            .lock()
            .get(run_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("test run {run_id}")))
    }

    async fn reset_test_run(&self, run_id: &str) -> Result<()> {
        self.resets.lock().push(run_id.to_string());
        self.runs.lock().insert(
            run_id.to_string(),
            TestRunStatus {
                state: TestRunState::InProgress,
                passed: 0,
                failed: 0,
                untested: 0,
            },
        );
        Ok(())
    }

    async fn cancel_test_run(&self, _run_id: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MockTickets {
    pub created: Mutex<Vec<(String, String)>>,
    counter: AtomicU64,
}

#[async_trait]
impl TicketProvider for MockTickets {
    async fn create_ticket(&self, summary: &str, description: &str) -> Result<String> {
        self.created
            .lock()
            .push((summary.to_string(), description.to_string()));
        Ok(format!("REL-{}", 100 + self.counter.fetch_add(1, Ordering::SeqCst)))
    }

    async fn get_ticket_status(&self, _ticket_key: &str) -> Result<String> {
        Ok("Open".to_string())
    }
}

#[derive(Default)]
pub struct MockNotifier {
    pub messages: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl NotifierProvider for MockNotifier {
    async fn send_message(&self, channel: &str, text: &str) -> Result<()> {
        self.messages
            .lock()
            .push((channel.to_string(), text.to_string()));
        Ok(())
    }
}

/// Handle bundle: the test keeps the concrete mocks, the engine gets the
/// trait objects.
#[derive(Clone)]
pub struct MockProviders {
    pub scm: Arc<MockScm>,
    pub ci: Arc<MockCi>,
    pub tests: Arc<MockTestPlatform>,
    pub tickets: Arc<MockTickets>,
    pub notifier: Arc<MockNotifier>,
}

impl MockProviders {
    pub fn new() -> Self {
        Self {
            scm: Arc::new(MockScm::with_branch("main", "base-sha")),
            ci: Arc::new(MockCi::default()),
            tests: Arc::new(MockTestPlatform::default()),
            tickets: Arc::new(MockTickets::default()),
            notifier: Arc::new(MockNotifier::default()),
        }
    }

    pub fn provider_set(&self) -> ProviderSet {
        ProviderSet {
            scm: self.scm.clone(),
            ci: self.ci.clone(),
            tests: self.tests.clone(),
            tickets: self.tickets.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

impl Default for MockProviders {
    fn default() -> Self {
        Self::new()
    }
}
