//! Regression cycle row: one round of build+test verification within the
//! REGRESSION stage. At most one cycle may be IN_PROGRESS per release;
//! "latest" is derived from creation time, never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleStatus {
    NotStarted,
    InProgress,
    Done,
    /// Opening failed after the tag was cut (build consumption error); the
    /// cycle never ran and a fresh one replaces it.
    Abandoned,
}

impl CycleStatus {
    /// A cycle in one of these statuses blocks approval and new cycle creation.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::NotStarted | Self::InProgress)
    }
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NOT_STARTED"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Done => write!(f, "DONE"),
            Self::Abandoned => write!(f, "ABANDONED"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionCycle {
    pub id: Uuid,
    pub release_id: Uuid,
    pub status: CycleStatus,
    /// Tag cut at the branch head when the cycle opened; the cherry-pick
    /// check compares the branch head against this tag's resolved commit.
    pub tag: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RegressionCycle {
    pub fn new(release_id: Uuid, tag: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            release_id,
            status: CycleStatus::InProgress,
            tag,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}
