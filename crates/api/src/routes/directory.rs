//! Member directory routes.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use rollcall_common::error::AppError;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/directory", get(directory_status))
        .route("/api/directory/reload", post(reload_directory))
}

/// GET /api/directory: Size of the snapshot audiences resolve against.
async fn directory_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.directory.snapshot();
    Json(json!({
        "members": snapshot.len(),
        "eligible": snapshot.eligible().count()
    }))
}

/// POST /api/directory/reload: Swap in a fresh snapshot from the `members`
/// table. Jobs already queued keep their frozen recipients.
async fn reload_directory(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let pool = state
        .pool
        .as_ref()
        .ok_or_else(|| AppError::Config("No database configured".to_string()))?;

    state
        .directory
        .reload(pool)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let snapshot = state.directory.snapshot();
    Ok(Json(json!({
        "reloaded": true,
        "members": snapshot.len()
    })))
}
