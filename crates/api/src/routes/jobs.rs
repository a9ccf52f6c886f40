//! Delivery job routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use rollcall_common::error::AppError;
use rollcall_common::types::{
    AttemptStatus, Channel, DeliveryAttempt, JobStats, JobStatus, JobSummary, Page,
};
use rollcall_engine::jobs::{CancelOutcome, CreateJobParams, JobFilter, PageRequest};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/jobs", post(create_job).get(list_jobs))
        .route("/api/jobs/{id}", get(get_job))
        .route("/api/jobs/{id}/stats", get(job_stats))
        .route("/api/jobs/{id}/attempts", get(job_attempts))
        .route("/api/jobs/{id}/cancel", post(cancel_job))
        .route("/api/jobs/{id}/receipts", post(record_receipt))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub channel: Option<Channel>,
    pub status: Option<JobStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ReceiptRequest {
    pub recipient_id: String,
    pub status: AttemptStatus,
    #[serde(default)]
    pub detail: Option<String>,
}

/// POST /api/jobs: Resolve the audience and queue one attempt per recipient.
async fn create_job(
    State(state): State<AppState>,
    Json(params): Json<CreateJobParams>,
) -> Result<(StatusCode, Json<JobSummary>), AppError> {
    let job_id = state.jobs.submit(params).await?;
    let summary = state.jobs.get(job_id)?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// GET /api/jobs: Newest first, filtered by channel and/or status.
async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Json<Page<JobSummary>> {
    let filter = JobFilter {
        channel: query.channel,
        status: query.status,
    };
    let page = PageRequest::new(
        query.page.unwrap_or(1),
        query.per_page.unwrap_or(state.config.default_page_size),
    );
    Json(state.jobs.list(filter, page))
}

/// GET /api/jobs/:id: Job summary with live counts.
async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobSummary>, AppError> {
    Ok(Json(state.jobs.get(id)?))
}

/// GET /api/jobs/:id/stats: Live delivery counts, for polling.
async fn job_stats(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobStats>, AppError> {
    Ok(Json(state.tracker.stats(id)?))
}

/// GET /api/jobs/:id/attempts: Per-recipient audit trail.
async fn job_attempts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DeliveryAttempt>>, AppError> {
    Ok(Json(state.jobs.attempts(id)?))
}

/// POST /api/jobs/:id/cancel: Cancel every attempt not yet claimed.
async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelOutcome>, AppError> {
    Ok(Json(state.jobs.cancel(id).await?))
}

/// POST /api/jobs/:id/receipts: Provider report for a sent attempt.
async fn record_receipt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(receipt): Json<ReceiptRequest>,
) -> Result<Json<DeliveryAttempt>, AppError> {
    let attempt = state
        .jobs
        .record_receipt(id, &receipt.recipient_id, receipt.status, receipt.detail)
        .await?;
    Ok(Json(attempt))
}
