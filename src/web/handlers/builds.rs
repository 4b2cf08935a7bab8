//! Build upload surface handlers.
//!
//! Manual build staging for releases in manual-upload mode: artifact files
//! arrive as multipart uploads and are persisted under the configured
//! artifact directory before the ledger records them; iOS builds can instead
//! be staged by TestFlight build number.

use crate::models::{Platform, Stage};
use crate::web::errors::{ApiError, ApiResult};
use crate::web::handlers::envelope;
use crate::web::state::AppState;
use axum::extract::multipart::Multipart;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

/// `PUT /releases/{release_id}/stages/{stage}/builds/{platform}`
///
/// Stages a manual build from a multipart `artifact` field. Returns the
/// upload id plus per-stage readiness (which platforms still lack a build).
pub async fn stage_build(
    State(state): State<AppState>,
    Path((release_id, stage, platform)): Path<(Uuid, Stage, Platform)>,
    mut multipart: Multipart,
) -> ApiResult<Json<serde_json::Value>> {
    let mut artifact: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(err.to_string()))?
    {
        if field.name() == Some("artifact") {
            let file_name = field
                .file_name()
                .map_or_else(|| format!("{platform}-build"), ToString::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|err| ApiError::bad_request(err.to_string()))?;
            artifact = Some((file_name, bytes.to_vec()));
            break;
        }
    }
    let (file_name, bytes) = artifact
        .ok_or_else(|| ApiError::bad_request("multipart field 'artifact' is required"))?;
    if bytes.is_empty() {
        return Err(ApiError::bad_request("artifact must not be empty"));
    }

    let artifact_path = persist_artifact(
        &state.engine.config().artifact_dir,
        release_id,
        stage,
        platform,
        &file_name,
        &bytes,
    )
    .await?;

    let staged = state
        .engine
        .stage_build_file(release_id, stage, platform, artifact_path)?;
    Ok(envelope(staged))
}

/// Writes the artifact under `{artifact_dir}/{release_id}/{stage}/` with a
/// unique prefix so a re-upload never clobbers a consumed build's file.
async fn persist_artifact(
    artifact_dir: &str,
    release_id: Uuid,
    stage: Stage,
    platform: Platform,
    file_name: &str,
    bytes: &[u8],
) -> ApiResult<String> {
    let dir = PathBuf::from(artifact_dir)
        .join(release_id.to_string())
        .join(stage.to_string());
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|err| ApiError::internal(format!("failed to create artifact dir: {err}")))?;
    let path = dir.join(format!("{}-{file_name}", Uuid::new_v4()));
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|err| ApiError::internal(format!("failed to persist artifact: {err}")))?;
    info!(
        %release_id,
        %stage,
        %platform,
        path = %path.display(),
        size = bytes.len(),
        "persisted build artifact"
    );
    Ok(path.to_string_lossy().into_owned())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTestflightRequest {
    pub build_number: String,
}

/// `POST /releases/{release_id}/stages/{stage}/builds/ios/verify-testflight`
///
/// Stages an iOS build by its external TestFlight build number instead of an
/// artifact file.
pub async fn verify_testflight(
    State(state): State<AppState>,
    Path((release_id, stage)): Path<(Uuid, Stage)>,
    body: Result<Json<VerifyTestflightRequest>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let Json(request) = body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let staged = state
        .engine
        .stage_testflight_build(release_id, stage, request.build_number)?;
    Ok(envelope(staged))
}

/// `DELETE /releases/{release_id}/builds/{upload_id}` - drop an unused
/// upload. Consumed uploads are undeletable and return 409.
pub async fn delete_upload(
    State(state): State<AppState>,
    Path((_release_id, upload_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<serde_json::Value>> {
    state.engine.delete_upload(upload_id)?;
    Ok(envelope(serde_json::json!({ "deleted": upload_id })))
}
