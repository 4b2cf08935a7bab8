//! # Cron Handlers
//!
//! Endpoints the external cron trigger invokes: the scheduler tick plus the
//! two workflow reconciliation passes. The poll endpoints take the release
//! and tenant in the body and reject anything malformed or empty with 400
//! before touching the engine.

use crate::web::errors::{ApiError, ApiResult};
use crate::web::handlers::envelope;
use crate::web::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRequest {
    pub release_id: String,
    pub app_id: String,
}

impl PollRequest {
    /// Non-empty field validation plus UUID parsing for the release id.
    fn validate(&self) -> ApiResult<Uuid> {
        if self.release_id.trim().is_empty() {
            return Err(ApiError::bad_request("releaseId must be a non-empty string"));
        }
        if self.app_id.trim().is_empty() {
            return Err(ApiError::bad_request("appId must be a non-empty string"));
        }
        Uuid::parse_str(&self.release_id)
            .map_err(|_| ApiError::bad_request(format!("invalid releaseId: {}", self.release_id)))
    }
}

fn accept(body: Result<Json<PollRequest>, JsonRejection>) -> ApiResult<(PollRequest, Uuid)> {
    let Json(request) = body.map_err(|rejection| {
        warn!(%rejection, "rejected malformed poll request body");
        ApiError::bad_request(rejection.body_text())
    })?;
    let release_id = request.validate()?;
    Ok((request, release_id))
}

/// `POST /internal/cron/builds/poll-pending-workflows`
pub async fn poll_pending_workflows(
    State(state): State<AppState>,
    body: Result<Json<PollRequest>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let (request, release_id) = accept(body)?;
    let report = state
        .engine
        .poll_pending_workflows(release_id, &request.app_id)
        .await?;
    Ok(envelope(report))
}

/// `POST /internal/cron/builds/poll-running-workflows`
pub async fn poll_running_workflows(
    State(state): State<AppState>,
    body: Result<Json<PollRequest>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let (request, release_id) = accept(body)?;
    let report = state
        .engine
        .poll_running_workflows(release_id, &request.app_id)
        .await?;
    Ok(envelope(report))
}

/// `POST /internal/cron/tick` - one scheduler pass over all active releases.
pub async fn run_tick(State(state): State<AppState>) -> Json<serde_json::Value> {
    let summary = state.engine.run_tick().await;
    envelope(summary)
}
