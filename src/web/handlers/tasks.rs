//! Task surface handlers.

use crate::models::{ReleasePhase, Stage};
use crate::web::errors::ApiResult;
use crate::web::handlers::envelope;
use crate::web::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    pub stage: Option<Stage>,
}

/// `GET /releases/{release_id}/tasks?stage=REGRESSION`
///
/// Returns the stage's task list and derived status; for REGRESSION the
/// overview additionally carries cycles, the approval gate and the unused
/// build uploads. Without an explicit stage the release's current stage is
/// reported (POST_REGRESSION once the release is DONE).
pub async fn list_tasks(
    State(state): State<AppState>,
    Path(release_id): Path<Uuid>,
    Query(query): Query<TaskQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let stage = match query.stage {
        Some(stage) => stage,
        None => {
            let release = state.engine.get_release(release_id)?;
            match release.phase {
                ReleasePhase::Done => Stage::PostRegression,
                phase => phase.as_stage().unwrap_or(Stage::Kickoff),
            }
        }
    };
    let overview = state.engine.stage_overview(release_id, stage).await?;
    Ok(envelope(overview))
}

/// `POST /releases/{release_id}/tasks/{task_id}/retry`
///
/// Resets a failed task to PENDING for the next tick. A no-op when the task
/// is already PENDING.
pub async fn retry_task(
    State(state): State<AppState>,
    Path((release_id, task_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<serde_json::Value>> {
    let task = state.engine.retry_task(release_id, task_id)?;
    Ok(envelope(task))
}
