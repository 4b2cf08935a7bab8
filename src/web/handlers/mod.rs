//! Request handlers for the HTTP surface.
//!
//! Every success response uses the `{ "success": true, "data": ... }`
//! envelope; errors convert through [`crate::web::errors::ApiError`].

pub mod approval;
pub mod builds;
pub mod cron;
pub mod health;
pub mod releases;
pub mod tasks;

use axum::Json;
use serde::Serialize;
use serde_json::json;

/// Wrap handler output in the success envelope.
pub(crate) fn envelope<T: Serialize>(data: T) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "data": data }))
}
