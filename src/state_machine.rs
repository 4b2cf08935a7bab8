//! # Task State Machine
//!
//! Status and conclusion definitions for release tasks, plus the legal
//! transition table the store enforces on every conditional update. The
//! transition table is the single place that encodes the task lifecycle:
//!
//! ```text
//! PENDING ──▶ IN_PROGRESS ──▶ COMPLETED
//!    │             ▲               ▲
//!    ├──▶ AWAITING_CALLBACK ───────┤
//!    │             │               │
//!    └─────────────┴──────────▶ FAILED ──(retry)──▶ PENDING
//! ```
//!
//! FAILED is recoverable only through a manual retry, which resets the same
//! task row back to PENDING. COMPLETED admits a single reset edge back to
//! PENDING, used when a human retries a task that completed with a failure
//! conclusion (e.g. a test run below threshold) and when a later regression
//! cycle re-arms its test-run tasks; the service layer never resets a
//! COMPLETED task whose conclusion was success, except for that re-arm.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution status of a release task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created but not yet dispatched.
    Pending,
    /// Dispatched and observed running externally.
    InProgress,
    /// Dispatched; external work started but not yet observed running.
    AwaitingCallback,
    /// Finished; see the conclusion for pass/fail.
    Completed,
    /// Dispatch or external execution failed; awaiting manual retry.
    Failed,
}

impl TaskStatus {
    /// Terminal statuses admit no further transitions except the manual
    /// retry reset out of Failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// A task counts as in-flight while external work may still be running.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::InProgress | Self::AwaitingCallback)
    }

    /// Whether a transition from `self` to `next` is legal.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, AwaitingCallback)
                | (Pending, Completed)
                | (Pending, Failed)
                | (AwaitingCallback, InProgress)
                | (AwaitingCallback, Completed)
                | (AwaitingCallback, Failed)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (Failed, Pending)
                | (Completed, Pending)
        )
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::AwaitingCallback => write!(f, "awaiting_callback"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "awaiting_callback" => Ok(Self::AwaitingCallback),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid task status: {s}")),
        }
    }
}

/// Outcome of a completed or failed task. A COMPLETED task with a failure
/// conclusion is a real result (e.g. test run below threshold), distinct from
/// a FAILED task whose dispatch or external execution errored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskConclusion {
    Success,
    Failure,
}

impl fmt::Display for TaskConclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

impl std::str::FromStr for TaskConclusion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            _ => Err(format!("Invalid task conclusion: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(!TaskStatus::AwaitingCallback.is_terminal());
    }

    #[test]
    fn test_retry_is_the_only_exit_from_failed() {
        assert!(TaskStatus::Failed.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Completed));
    }

    #[test]
    fn test_completed_admits_only_the_reset_edge() {
        assert!(TaskStatus::Completed.can_transition_to(TaskStatus::Pending));
        for next in [
            TaskStatus::InProgress,
            TaskStatus::AwaitingCallback,
            TaskStatus::Failed,
        ] {
            assert!(!TaskStatus::Completed.can_transition_to(next));
        }
    }

    #[test]
    fn test_async_dispatch_path() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::AwaitingCallback));
        assert!(TaskStatus::AwaitingCallback.can_transition_to(TaskStatus::InProgress));
        assert!(TaskStatus::AwaitingCallback.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Completed));
    }

    #[test]
    fn test_status_string_round_trip() {
        assert_eq!(TaskStatus::AwaitingCallback.to_string(), "awaiting_callback");
        assert_eq!(
            "awaiting_callback".parse::<TaskStatus>().unwrap(),
            TaskStatus::AwaitingCallback
        );
        assert_eq!(
            "failure".parse::<TaskConclusion>().unwrap(),
            TaskConclusion::Failure
        );
        assert!("finished".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_status_serde_wire_form() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let parsed: TaskStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, TaskStatus::InProgress);
    }
}
