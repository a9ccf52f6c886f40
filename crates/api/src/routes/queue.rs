use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use rollcall_common::types::QueueStats;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/queue", get(queue_status))
}

/// GET /api/queue: Totals across all jobs and whether a send is in flight.
async fn queue_status(State(state): State<AppState>) -> Json<QueueStats> {
    Json(state.tracker.queue_stats())
}
