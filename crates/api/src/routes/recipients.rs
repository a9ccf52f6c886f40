//! Roster upload.

use axum::body::Bytes;
use axum::routing::post;
use axum::{Json, Router};

use rollcall_common::error::AppError;
use rollcall_engine::dedup::{ImportSummary, import_recipients};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/recipients/import", post(import))
}

/// POST /api/recipients/import: Parse a CSV roster (raw body) into a
/// de-duplicated recipient list.
async fn import(body: Bytes) -> Result<Json<ImportSummary>, AppError> {
    if body.is_empty() {
        return Err(AppError::Validation("Roster file is empty".to_string()));
    }

    let summary = import_recipients(&body);
    tracing::info!(
        recipients = summary.count,
        skipped = summary.skipped,
        "Roster imported"
    );
    Ok(Json(summary))
}
