//! Router-level tests exercising the HTTP surface through `tower::oneshot`:
//! envelope shape, validation of the cron poll bodies, the retry no-op, and
//! TestFlight staging.

mod common;

use axum::http::StatusCode;
use axum::Router;
use http_body_util::BodyExt;
use liftoff_core::web::build_router;
use liftoff_core::{BuildMode, Platform};
use serde_json::{json, Value};
use tower::ServiceExt;

fn router(h: &common::Harness) -> Router {
    build_router(h.engine.clone())
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let req = axum::http::Request::builder()
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn send_json(
    app: Router,
    method: &str,
    uri: &str,
    body: Value,
) -> (StatusCode, Value) {
    let req = axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn release_body(version: &str) -> Value {
    json!({
        "app_id": "acme-app",
        "version": version,
        "repo": "acme/mobile-app",
        "base_branch": "main",
        "kickoff_at": "2026-08-20T09:00:00Z",
        "target_release_at": "2026-09-10T09:00:00Z",
        "platforms": ["ios", "android"],
        "build_mode": "manual_upload"
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let h = common::harness();
    let (status, body) = get(router(&h), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_release_registration_and_task_listing() {
    let h = common::harness();
    let (status, body) =
        send_json(router(&h), "POST", "/releases", release_body("7.0.0")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["branch"], "release/7.0.0");
    let release_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = get(
        router(&h),
        &format!("/releases/{release_id}/tasks?stage=KICKOFF"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["tasks"].as_array().unwrap().len(), 3);
    assert_eq!(body["data"]["status"], "in_progress");
    assert!(body["data"].get("cycles").is_none());

    // Without an explicit stage the release's current stage is reported.
    let (status, body) = get(router(&h), &format!("/releases/{release_id}/tasks")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["stage"], "KICKOFF");
}

#[tokio::test]
async fn test_invalid_release_registration_is_rejected() {
    let h = common::harness();
    let mut body = release_body("7.1.0");
    body["target_release_at"] = json!("2026-08-01T09:00:00Z"); // before kickoff
    let (status, body) = send_json(router(&h), "POST", "/releases", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_poll_endpoints_validate_their_bodies() {
    let h = common::harness();
    let uri = "/internal/cron/builds/poll-pending-workflows";

    // Missing appId field entirely.
    let (status, body) = send_json(
        router(&h),
        "POST",
        uri,
        json!({ "releaseId": "0d4a9bca-93f4-4c7c-8a3f-111111111111" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    // Empty strings fail the non-empty validation.
    let (status, _) = send_json(
        router(&h),
        "POST",
        uri,
        json!({ "releaseId": "", "appId": "acme-app" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send_json(
        router(&h),
        "POST",
        uri,
        json!({ "releaseId": "0d4a9bca-93f4-4c7c-8a3f-111111111111", "appId": " " }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Well-formed but unknown release.
    let (status, body) = send_json(
        router(&h),
        "POST",
        uri,
        json!({ "releaseId": "0d4a9bca-93f4-4c7c-8a3f-111111111111", "appId": "acme-app" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_poll_endpoint_returns_reconciliation_summary() {
    let h = common::harness();
    let release = common::create_release(&h, "7.2.0", BuildMode::Ci);

    let (status, body) = send_json(
        router(&h),
        "POST",
        "/internal/cron/builds/poll-running-workflows",
        json!({ "releaseId": release.id.to_string(), "appId": "acme-app" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["checked"], 0);
    assert!(body["data"]["transitions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_retry_is_a_noop_on_pending_tasks() {
    let h = common::harness();
    let release = common::create_release(&h, "7.3.0", BuildMode::Ci);
    let task = h
        .store
        .tasks_for_stage(release.id, liftoff_core::Stage::Kickoff)
        .into_iter()
        .next()
        .unwrap();

    let (status, body) = send_json(
        router(&h),
        "POST",
        &format!("/releases/{}/tasks/{}/retry", release.id, task.id),
        Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "pending");
}

#[tokio::test]
async fn test_retry_rejects_succeeded_tasks() {
    let h = common::harness();
    let release = common::create_release(&h, "7.4.0", BuildMode::Ci);
    h.engine.run_tick().await; // fork completes with success
    let fork = h
        .store
        .tasks_for_stage(release.id, liftoff_core::Stage::Kickoff)
        .into_iter()
        .find(|t| t.task_type == liftoff_core::TaskType::ForkBranch)
        .unwrap();

    let (status, body) = send_json(
        router(&h),
        "POST",
        &format!("/releases/{}/tasks/{}/retry", release.id, fork.id),
        Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_verify_testflight_stages_an_ios_build() {
    let h = common::harness();
    let release = common::create_release(&h, "7.5.0", BuildMode::ManualUpload);

    let (status, body) = send_json(
        router(&h),
        "POST",
        &format!(
            "/releases/{}/stages/REGRESSION/builds/ios/verify-testflight",
            release.id
        ),
        json!({ "buildNumber": "8421" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["all_ready"], false);
    assert_eq!(body["data"]["missing_platforms"], json!(["android"]));

    // Unused uploads are replaceable and deletable.
    let upload_id = body["data"]["upload_id"].as_str().unwrap().to_string();
    let req = axum::http::Request::builder()
        .method("DELETE")
        .uri(format!("/releases/{}/builds/{upload_id}", release.id))
        .body(axum::body::Body::empty())
        .unwrap();
    let response = router(&h).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(h
        .store
        .unused_uploads(release.id, liftoff_core::Stage::Regression)
        .is_empty());
}

#[tokio::test]
async fn test_staging_a_build_for_an_untargeted_platform_is_rejected() {
    let h = common::harness();
    let release = h
        .engine
        .create_release(liftoff_core::engine::NewRelease {
            platforms: vec![Platform::Android],
            ..common::new_release("7.6.0", BuildMode::ManualUpload)
        })
        .unwrap();

    let (status, body) = send_json(
        router(&h),
        "POST",
        &format!(
            "/releases/{}/stages/REGRESSION/builds/ios/verify-testflight",
            release.id
        ),
        json!({ "buildNumber": "8421" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}
