//! # HTTP Surface
//!
//! Bundled axum router over [`crate::engine::ReleaseEngine`]. The host can
//! mount [`build_router`] into its own server or call [`serve`] to run one.
//!
//! Route groups:
//!
//! - `/internal/cron/*` - endpoints the external cron trigger invokes
//! - `/releases` and `/releases/{release_id}/*` - registry, task, build
//!   upload and approval surfaces
//! - `/health` - liveness probe

pub mod errors;
pub mod handlers;
pub mod state;

use crate::engine::ReleaseEngine;
use axum::routing::{delete, get, post, put};
use axum::Router;
use state::AppState;
use tracing::info;

/// Build the axum Router with all API routes.
/// Used by `serve()` and available for integration testing.
pub fn build_router(engine: ReleaseEngine) -> Router {
    let app_state = AppState::new(engine);

    Router::new()
        // Cron surface
        .route("/internal/cron/tick", post(handlers::cron::run_tick))
        .route(
            "/internal/cron/builds/poll-pending-workflows",
            post(handlers::cron::poll_pending_workflows),
        )
        .route(
            "/internal/cron/builds/poll-running-workflows",
            post(handlers::cron::poll_running_workflows),
        )
        // Release registry
        .route("/releases", post(handlers::releases::create_release))
        .route("/releases", get(handlers::releases::list_releases))
        .route(
            "/releases/{release_id}",
            get(handlers::releases::get_release),
        )
        // Task surface
        .route(
            "/releases/{release_id}/tasks",
            get(handlers::tasks::list_tasks),
        )
        .route(
            "/releases/{release_id}/tasks/{task_id}/retry",
            post(handlers::tasks::retry_task),
        )
        // Build upload surface
        .route(
            "/releases/{release_id}/stages/{stage}/builds/{platform}",
            put(handlers::builds::stage_build),
        )
        .route(
            "/releases/{release_id}/stages/{stage}/builds/ios/verify-testflight",
            post(handlers::builds::verify_testflight),
        )
        .route(
            "/releases/{release_id}/builds/{upload_id}",
            delete(handlers::builds::delete_upload),
        )
        // Approval surface
        .route(
            "/releases/{release_id}/stages/regression/approval",
            get(handlers::approval::approval_status),
        )
        .route(
            "/releases/{release_id}/stages/regression/approve",
            post(handlers::approval::approve),
        )
        // Health
        .route("/health", get(handlers::health::health))
        .with_state(app_state)
}

/// Bind and serve the router on the engine's configured address.
pub async fn serve(engine: ReleaseEngine) -> std::io::Result<()> {
    let bind_address = engine.config().bind_address.clone();
    let router = build_router(engine);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!(%bind_address, "release engine API listening");
    axum::serve(listener, router).await
}
