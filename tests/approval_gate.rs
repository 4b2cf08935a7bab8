//! Approval gate evaluation: the three booleans independently, cherry-pick
//! resolution through annotated tag chains, conservative blocking on lookup
//! failures, and the idempotent cycle tag cut.

mod common;

use common::Harness;
use liftoff_core::cycles::RegressionCycleManager;
use liftoff_core::models::{CycleStatus, RegressionCycle, ReleaseTask};
use liftoff_core::providers::GitObjectKind;
use liftoff_core::sequencer::TaskSequencer;
use liftoff_core::uploads::BuildUploadLedger;
use liftoff_core::{
    BuildMode, Platform, Release, ReleasePhase, Stage, TaskConclusion, TaskStatus, TaskType,
};
use std::sync::Arc;

/// Fabricate a release sitting at the end of regression: phase REGRESSION,
/// both test-run tasks succeeded, one DONE cycle tagged `v{version}-rc.1`,
/// and the SCM agreeing that the branch head equals the tag commit.
fn regression_complete(h: &Harness, version: &str) -> Release {
    let release = h
        .engine
        .create_release(common::new_release(version, BuildMode::ManualUpload))
        .unwrap();
    h.store
        .set_phase(release.id, ReleasePhase::Kickoff, ReleasePhase::Regression)
        .unwrap();
    for platform in [Platform::Ios, Platform::Android] {
        let task = ReleaseTask::new(
            release.id,
            Stage::Regression,
            TaskType::CreateTestRun,
            Some(platform),
            vec![],
        );
        let (task, _) = h.store.create_task_if_absent(task);
        h.store
            .transition_task(task.id, &[TaskStatus::Pending], TaskStatus::Completed, |t| {
                t.conclusion = Some(TaskConclusion::Success);
            })
            .unwrap();
    }
    let cycle = h
        .store
        .insert_cycle(RegressionCycle::new(release.id, Some(format!("v{version}-rc.1"))));
    h.store
        .transition_cycle(cycle.id, &[CycleStatus::InProgress], CycleStatus::Done, |c| {
            c.completed_at = Some(chrono::Utc::now());
        })
        .unwrap();

    h.providers.scm.set_branch_head(&release.branch, "abc");
    h.providers
        .scm
        .set_ref(&format!("tags/v{version}-rc.1"), "abc", GitObjectKind::Commit);
    h.store.get_release(release.id).unwrap()
}

#[tokio::test]
async fn test_gate_opens_only_when_all_three_conditions_hold() {
    let h = common::harness();
    let release = regression_complete(&h, "5.0.0");

    let status = h.engine.evaluate_approval(release.id).await.unwrap();
    assert!(status.test_management_passed);
    assert!(status.cherry_pick_clean);
    assert!(status.cycles_completed);
    assert!(status.can_approve);

    h.engine.approve_regression(release.id).await.unwrap();
    let release = h.store.get_release(release.id).unwrap();
    assert_eq!(release.phase, ReleasePhase::PostRegression);
    assert_eq!(
        h.store.tasks_for_stage(release.id, Stage::PostRegression).len(),
        3
    );
}

#[tokio::test]
async fn test_failed_test_run_blocks_the_gate() {
    let h = common::harness();
    let release = regression_complete(&h, "5.1.0");
    let task = h
        .store
        .tasks_for_stage(release.id, Stage::Regression)
        .into_iter()
        .find(|t| t.task_type == TaskType::CreateTestRun)
        .unwrap();
    h.store
        .transition_task(task.id, &[TaskStatus::Completed], TaskStatus::Pending, |t| {
            t.conclusion = None;
        })
        .unwrap();
    h.store
        .transition_task(task.id, &[TaskStatus::Pending], TaskStatus::Failed, |t| {
            t.conclusion = Some(TaskConclusion::Failure);
            t.record_error("device farm lost the session");
        })
        .unwrap();

    let status = h.engine.evaluate_approval(release.id).await.unwrap();
    assert!(!status.test_management_passed);
    assert!(status.cherry_pick_clean);
    assert!(status.cycles_completed);
    assert!(!status.can_approve);

    let err = h.engine.approve_regression(release.id).await.unwrap_err();
    assert!(matches!(err, liftoff_core::EngineError::Validation(_)));
    assert_eq!(
        h.store.get_release(release.id).unwrap().phase,
        ReleasePhase::Regression
    );
}

#[tokio::test]
async fn test_open_cycle_blocks_the_gate() {
    let h = common::harness();
    let release = regression_complete(&h, "5.2.0");
    h.store
        .insert_cycle(RegressionCycle::new(release.id, Some("v5.2.0-rc.2".to_string())));
    h.providers
        .scm
        .set_ref("tags/v5.2.0-rc.2", "abc", GitObjectKind::Commit);

    let status = h.engine.evaluate_approval(release.id).await.unwrap();
    assert!(!status.cycles_completed);
    assert!(!status.can_approve);
}

#[tokio::test]
async fn test_commits_after_the_cycle_tag_dirty_the_cherry_pick() {
    let h = common::harness();
    let release = regression_complete(&h, "5.3.0");
    // A commit lands on the release branch after the cycle tag was cut.
    h.providers.scm.set_branch_head(&release.branch, "def");

    let status = h.engine.evaluate_approval(release.id).await.unwrap();
    assert!(status.test_management_passed);
    assert!(status.cycles_completed);
    assert!(!status.cherry_pick_clean);
    assert!(!status.can_approve);
}

#[tokio::test]
async fn test_annotated_tag_resolves_through_one_dereference() {
    let h = common::harness();
    let release = regression_complete(&h, "5.4.0");
    h.providers
        .scm
        .set_ref("tags/v5.4.0-rc.1", "tagobj-1", GitObjectKind::Tag);
    h.providers
        .scm
        .set_tag_object("tagobj-1", "abc", GitObjectKind::Commit);

    let status = h.engine.evaluate_approval(release.id).await.unwrap();
    assert!(status.cherry_pick_clean);
}

#[tokio::test]
async fn test_annotated_tag_resolves_through_two_dereferences() {
    let h = common::harness();
    let release = regression_complete(&h, "5.5.0");
    h.providers
        .scm
        .set_ref("tags/v5.5.0-rc.1", "tagobj-1", GitObjectKind::Tag);
    h.providers
        .scm
        .set_tag_object("tagobj-1", "tagobj-2", GitObjectKind::Tag);
    h.providers
        .scm
        .set_tag_object("tagobj-2", "abc", GitObjectKind::Commit);

    let status = h.engine.evaluate_approval(release.id).await.unwrap();
    assert!(status.cherry_pick_clean);
}

#[tokio::test]
async fn test_tag_chain_deeper_than_two_blocks_the_gate() {
    let h = common::harness();
    let release = regression_complete(&h, "5.6.0");
    h.providers
        .scm
        .set_ref("tags/v5.6.0-rc.1", "tagobj-1", GitObjectKind::Tag);
    h.providers
        .scm
        .set_tag_object("tagobj-1", "tagobj-2", GitObjectKind::Tag);
    h.providers
        .scm
        .set_tag_object("tagobj-2", "tagobj-3", GitObjectKind::Tag);

    let status = h.engine.evaluate_approval(release.id).await.unwrap();
    assert!(!status.cherry_pick_clean);
}

#[tokio::test]
async fn test_unresolvable_tag_blocks_the_gate() {
    let h = common::harness();
    let release = regression_complete(&h, "5.7.0");
    h.providers.scm.refs.lock().remove("tags/v5.7.0-rc.1");

    let status = h.engine.evaluate_approval(release.id).await.unwrap();
    assert!(!status.cherry_pick_clean);
    assert!(!status.can_approve);
}

#[tokio::test]
async fn test_scm_outage_blocks_the_gate_without_erroring() {
    let h = common::harness();
    let release = regression_complete(&h, "5.8.0");
    *h.providers.scm.fail_reads.lock() = true;

    let status = h.engine.evaluate_approval(release.id).await.unwrap();
    assert!(!status.cherry_pick_clean);
    assert!(!status.can_approve);
}

#[tokio::test]
async fn test_preexisting_release_tag_is_treated_as_cut() {
    let h = common::harness();
    let release = regression_complete(&h, "6.0.0");
    // A prior crashed attempt already cut the final tag at the branch head.
    h.providers
        .scm
        .set_ref("tags/v6.0.0", "abc", GitObjectKind::Commit);
    h.engine.approve_regression(release.id).await.unwrap();

    h.engine.run_tick().await; // notes + tag
    h.engine.run_tick().await; // notify

    let release = h.store.get_release(release.id).unwrap();
    assert_eq!(release.phase, ReleasePhase::Done);
    let tag_task = h
        .store
        .tasks_for_stage(release.id, Stage::PostRegression)
        .into_iter()
        .find(|t| t.task_type == TaskType::CreateReleaseTag)
        .unwrap();
    assert!(tag_task.succeeded());
    assert_eq!(tag_task.external_data["note"], "already existed");
    // The existing ref was not overwritten.
    assert_eq!(h.providers.scm.refs.lock()["tags/v6.0.0"].sha, "abc");
}

#[tokio::test]
async fn test_cycle_tag_cut_is_idempotent() {
    let h = common::harness();
    let release = h
        .engine
        .create_release(common::new_release("5.9.0", BuildMode::Ci))
        .unwrap();
    h.providers.scm.set_branch_head(&release.branch, "abc");
    // A prior crashed attempt already cut the tag.
    h.providers
        .scm
        .set_ref("tags/v5.9.0-rc.1", "abc", GitObjectKind::Commit);

    let ledger = BuildUploadLedger::new(Arc::clone(&h.store));
    let sequencer = TaskSequencer::new(Arc::clone(&h.store), ledger.clone());
    let manager = RegressionCycleManager::new(
        Arc::clone(&h.store),
        ledger,
        h.providers.provider_set(),
        sequencer,
    );
    let cycle = manager.start_cycle(&release, None).await.unwrap();
    assert_eq!(cycle.tag.as_deref(), Some("v5.9.0-rc.1"));
    assert_eq!(cycle.status, CycleStatus::InProgress);

    // A second open while one is in progress is refused.
    let err = manager.start_cycle(&release, None).await.unwrap_err();
    assert!(err.is_conflict());
}
