//! Release registry handlers.

use crate::engine::NewRelease;
use crate::web::errors::{ApiError, ApiResult};
use crate::web::handlers::envelope;
use crate::web::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

/// `POST /releases` - register a release and seed its kickoff task set.
pub async fn create_release(
    State(state): State<AppState>,
    body: Result<Json<NewRelease>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let Json(params) = body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let release = state.engine.create_release(params)?;
    state.engine.seed_current_stage(release.id)?;
    Ok(envelope(release))
}

/// `GET /releases`
pub async fn list_releases(State(state): State<AppState>) -> Json<serde_json::Value> {
    envelope(state.engine.list_releases())
}

/// `GET /releases/{release_id}`
pub async fn get_release(
    State(state): State<AppState>,
    Path(release_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    Ok(envelope(state.engine.get_release(release_id)?))
}
