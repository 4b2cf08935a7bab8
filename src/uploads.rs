//! # Build Upload Ledger
//!
//! Tracks manually staged build artifacts per `(release, stage, platform)`
//! and enforces at-most-once consumption. Unused uploads may be replaced or
//! deleted; once a task or cycle consumes an upload the row is immutable.
//! The ledger also answers the readiness question the sequencer's
//! manual-upload gate and the build surface both depend on: are all of the
//! release's platforms staged for a stage, and which are still missing.

use crate::error::Result;
use crate::models::{
    BuildUpload, Platform, Release, Stage, UploadConsumer, UploadSource,
};
use crate::store::EngineStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Readiness of a stage's manual builds across the release's platforms.
#[derive(Debug, Clone, Serialize)]
pub struct UploadReadiness {
    pub all_ready: bool,
    pub missing_platforms: Vec<Platform>,
}

#[derive(Clone)]
pub struct BuildUploadLedger {
    store: Arc<EngineStore>,
}

impl BuildUploadLedger {
    pub fn new(store: Arc<EngineStore>) -> Self {
        Self { store }
    }

    /// Stage an uploaded artifact file. Replaces an unused upload for the
    /// same platform; a consumed upload is never touched.
    pub fn stage_file(
        &self,
        release: &Release,
        stage: Stage,
        platform: Platform,
        artifact_path: String,
    ) -> Result<BuildUpload> {
        let upload = self.store.upsert_upload(
            release.id,
            stage,
            platform,
            UploadSource::UploadedFile,
            artifact_path,
        )?;
        info!(
            release_id = %release.id,
            stage = %stage,
            platform = %platform,
            upload_id = %upload.id,
            "staged build artifact"
        );
        Ok(upload)
    }

    /// Stage an iOS build by its external TestFlight build number instead of
    /// an artifact file.
    pub fn stage_testflight_build(
        &self,
        release: &Release,
        stage: Stage,
        build_number: String,
    ) -> Result<BuildUpload> {
        let upload = self.store.upsert_upload(
            release.id,
            stage,
            Platform::Ios,
            UploadSource::TestFlight,
            build_number,
        )?;
        info!(
            release_id = %release.id,
            stage = %stage,
            build_number = %upload.artifact_ref,
            "staged TestFlight build"
        );
        Ok(upload)
    }

    /// Whether every platform the release targets has an unused upload for
    /// the stage, and which platforms are still missing.
    pub fn readiness(&self, release: &Release, stage: Stage) -> UploadReadiness {
        let staged: Vec<Platform> = self
            .store
            .unused_uploads(release.id, stage)
            .into_iter()
            .map(|u| u.platform)
            .collect();
        let missing_platforms: Vec<Platform> = release
            .platforms
            .iter()
            .copied()
            .filter(|p| !staged.contains(p))
            .collect();
        UploadReadiness {
            all_ready: missing_platforms.is_empty(),
            missing_platforms,
        }
    }

    pub fn available(&self, release_id: Uuid, stage: Stage) -> Vec<BuildUpload> {
        self.store.unused_uploads(release_id, stage)
    }

    /// Consume one unused upload per targeted platform, marking each used by
    /// the given cycle. Fails without consuming anything if a platform has no
    /// staged build.
    pub fn consume_for_cycle(
        &self,
        release: &Release,
        stage: Stage,
        cycle_id: Uuid,
    ) -> Result<Vec<BuildUpload>> {
        let mut pending = Vec::with_capacity(release.platforms.len());
        for platform in &release.platforms {
            let upload = self
                .store
                .find_unused_upload(release.id, stage, *platform)
                .ok_or_else(|| {
                    crate::error::EngineError::not_found(format!(
                        "no staged build for platform {platform} in stage {stage}"
                    ))
                })?;
            pending.push(upload);
        }
        let mut consumed = Vec::with_capacity(pending.len());
        for upload in pending {
            consumed.push(
                self.store
                    .mark_upload_used(upload.id, UploadConsumer::Cycle(cycle_id))?,
            );
        }
        Ok(consumed)
    }

    pub fn delete(&self, upload_id: Uuid) -> Result<()> {
        self.store.delete_upload(upload_id)
    }
}
