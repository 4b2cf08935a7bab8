//! Build upload ledger row. `is_used` flips true exactly once, atomically,
//! when a task or cycle consumes the upload; used rows are immutable and
//! undeletable.

use crate::models::release::{Platform, Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a staged build came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadSource {
    /// Artifact file uploaded through the build surface.
    UploadedFile,
    /// iOS build referenced by its external TestFlight build number.
    TestFlight,
}

/// What consumed an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadConsumer {
    Task(Uuid),
    Cycle(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildUpload {
    pub id: Uuid,
    pub release_id: Uuid,
    pub platform: Platform,
    pub stage: Stage,
    pub source: UploadSource,
    /// Artifact path for uploaded files, or the TestFlight build number.
    pub artifact_ref: String,
    pub is_used: bool,
    pub used_by_task_id: Option<Uuid>,
    pub used_by_cycle_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl BuildUpload {
    pub fn new(
        release_id: Uuid,
        platform: Platform,
        stage: Stage,
        source: UploadSource,
        artifact_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            release_id,
            platform,
            stage,
            source,
            artifact_ref: artifact_ref.into(),
            is_used: false,
            used_by_task_id: None,
            used_by_cycle_id: None,
            created_at: Utc::now(),
        }
    }
}
