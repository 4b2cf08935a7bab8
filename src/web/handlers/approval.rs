//! Approval surface handlers.

use crate::web::errors::ApiResult;
use crate::web::handlers::envelope;
use crate::web::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

/// `GET /releases/{release_id}/stages/regression/approval` - the current
/// gate evaluation without acting on it.
pub async fn approval_status(
    State(state): State<AppState>,
    Path(release_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let status = state.engine.evaluate_approval(release_id).await?;
    Ok(envelope(status))
}

/// `POST /releases/{release_id}/stages/regression/approve`
///
/// Accepted only when every gate condition holds; advances the release to
/// POST_REGRESSION and seeds its task set.
pub async fn approve(
    State(state): State<AppState>,
    Path(release_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let status = state.engine.approve_regression(release_id).await?;
    Ok(envelope(status))
}
