//! Job service: submission, listing and cancellation of delivery jobs.
//!
//! Submission is the only place attempts are created:
//! 1. Validate the payload and audience
//! 2. Resolve the audience against the current directory snapshot
//! 3. De-duplicate and materialize one QUEUED attempt per recipient
//! 4. Journal the job, then publish it to the attempt store
//!
//! Any failure before step 4 leaves no trace: no job, no attempts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rollcall_common::error::AppError;
use rollcall_common::types::{
    AttemptStatus, AudienceSpecification, Channel, DeliveryAttempt, DeliveryJob, JobStats,
    JobStatus, JobSummary, Page, Payload,
};

use crate::dedup::dedupe;
use crate::journal::Journal;
use crate::resolver::AudienceResolver;
use crate::store::AttemptStore;

/// Largest page a listing will return.
const MAX_PER_PAGE: u32 = 100;

/// Error recorded on attempts found mid-send when the journal is reloaded.
const INTERRUPTED_ERROR: &str = "interrupted before outcome was recorded";

/// Parameters for creating a new delivery job.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobParams {
    pub audience: AudienceSpecification,
    pub payload: Payload,
    pub channel: Channel,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Optional filters for job listings.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct JobFilter {
    pub channel: Option<Channel>,
    pub status: Option<JobStatus>,
}

/// 1-based page selection.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }
}

/// Result of a successful cancellation.
#[derive(Debug, Clone, Serialize)]
pub struct CancelOutcome {
    pub job_id: Uuid,
    pub cancelled: usize,
    pub stats: JobStats,
}

/// Service layer over the resolver, the attempt store and the journal.
#[derive(Clone)]
pub struct JobService {
    resolver: AudienceResolver,
    store: Arc<AttemptStore>,
    journal: Arc<dyn Journal>,
}

impl JobService {
    pub fn new(
        resolver: AudienceResolver,
        store: Arc<AttemptStore>,
        journal: Arc<dyn Journal>,
    ) -> Self {
        Self {
            resolver,
            store,
            journal,
        }
    }

    pub fn store(&self) -> &Arc<AttemptStore> {
        &self.store
    }

    pub fn journal(&self) -> &Arc<dyn Journal> {
        &self.journal
    }

    pub fn resolver(&self) -> &AudienceResolver {
        &self.resolver
    }

    /// Build the job and its attempts without publishing anything.
    pub fn prepare(
        &self,
        params: CreateJobParams,
    ) -> Result<(DeliveryJob, Vec<DeliveryAttempt>), AppError> {
        if params.payload.is_empty() {
            return Err(AppError::Validation(
                "Payload needs a title or a body".to_string(),
            ));
        }

        let resolution = self.resolver.resolve(&params.audience, params.channel)?;

        let mut job = DeliveryJob::draft(
            params.audience,
            params.payload,
            params.channel,
            params.scheduled_at,
        );
        let attempts: Vec<DeliveryAttempt> = dedupe(&resolution)
            .map(|recipient| DeliveryAttempt::queued(job.id, recipient))
            .collect();

        if attempts.is_empty() {
            return Err(AppError::Validation(format!(
                "Audience '{}' resolved to no recipients on channel '{}'",
                job.audience.target_type, job.channel
            )));
        }

        job.status = JobStatus::Queued;
        Ok((job, attempts))
    }

    /// Create a job: resolve, de-duplicate, materialize attempts, queue.
    pub async fn submit(&self, params: CreateJobParams) -> Result<Uuid, AppError> {
        let (job, attempts) = self.prepare(params)?;

        self.journal.record_job(&job, &attempts).await?;
        let entry = self.store.insert(job, attempts)?;

        tracing::info!(
            job_id = %entry.id(),
            channel = %entry.job().channel,
            target_type = %entry.job().audience.target_type,
            recipients = entry.stats().total,
            scheduled_at = ?entry.job().scheduled_at,
            "Delivery job queued"
        );

        Ok(entry.id())
    }

    pub fn get(&self, job_id: Uuid) -> Result<JobSummary, AppError> {
        self.store
            .get(job_id)
            .map(|entry| entry.summary())
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))
    }

    /// Full attempt audit trail of a job.
    pub fn attempts(&self, job_id: Uuid) -> Result<Vec<DeliveryAttempt>, AppError> {
        self.store
            .get(job_id)
            .map(|entry| entry.attempts())
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))
    }

    /// Newest jobs first, optionally filtered by channel and status.
    pub fn list(&self, filter: JobFilter, page: PageRequest) -> Page<JobSummary> {
        let page = PageRequest::new(page.page, page.per_page);

        let mut matching: Vec<JobSummary> = self
            .store
            .entries()
            .iter()
            .filter(|entry| filter.channel.is_none_or(|c| entry.job().channel == c))
            .map(|entry| entry.summary())
            .filter(|summary| filter.status.is_none_or(|s| summary.status == s))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let skip = (page.page as usize - 1).saturating_mul(page.per_page as usize);
        let items = matching
            .into_iter()
            .skip(skip)
            .take(page.per_page as usize)
            .collect();

        Page {
            items,
            page: page.page,
            per_page: page.per_page,
            total,
        }
    }

    /// Cancel the still-queued attempts of a job.
    pub async fn cancel(&self, job_id: Uuid) -> Result<CancelOutcome, AppError> {
        let cancelled = self.store.cancel(job_id)?;

        for attempt in &cancelled {
            if let Err(e) = self.journal.record_attempt(attempt).await {
                tracing::warn!(
                    job_id = %job_id,
                    recipient_id = %attempt.recipient.id,
                    error = %e,
                    "Failed to journal cancellation"
                );
            }
        }

        let stats = self
            .store
            .get(job_id)
            .map(|entry| entry.stats())
            .unwrap_or_default();

        tracing::info!(
            job_id = %job_id,
            cancelled = cancelled.len(),
            "Delivery job cancelled"
        );

        Ok(CancelOutcome {
            job_id,
            cancelled: cancelled.len(),
            stats,
        })
    }

    /// Apply a provider's delivered/bounced report to a SENT attempt.
    pub async fn record_receipt(
        &self,
        job_id: Uuid,
        recipient_id: &str,
        status: AttemptStatus,
        detail: Option<String>,
    ) -> Result<DeliveryAttempt, AppError> {
        let attempt = self
            .store
            .record_receipt(job_id, recipient_id, status, detail)?;

        if let Err(e) = self.journal.record_attempt(&attempt).await {
            tracing::warn!(
                job_id = %job_id,
                recipient_id = %recipient_id,
                error = %e,
                "Failed to journal delivery receipt"
            );
        }

        tracing::info!(
            job_id = %job_id,
            recipient_id = %recipient_id,
            status = %attempt.status,
            "Delivery receipt recorded"
        );

        Ok(attempt)
    }

    /// Rebuild the store from the journal. Returns the number of jobs loaded.
    ///
    /// Attempts found in SENDING were cut off mid-send; they are closed as
    /// FAILED rather than sent again.
    pub async fn restore(&self) -> Result<usize, AppError> {
        let journaled = self.journal.load().await?;
        let mut restored = 0usize;

        for (job, mut attempts) in journaled {
            if self.store.get(job.id).is_some() {
                continue;
            }

            for attempt in attempts
                .iter_mut()
                .filter(|a| a.status == AttemptStatus::Sending)
            {
                attempt.status = AttemptStatus::Failed;
                attempt.error = Some(INTERRUPTED_ERROR.to_string());
                if let Err(e) = self.journal.record_attempt(attempt).await {
                    tracing::warn!(
                        job_id = %job.id,
                        recipient_id = %attempt.recipient.id,
                        error = %e,
                        "Failed to journal interrupted attempt"
                    );
                }
            }

            self.store.insert(job, attempts)?;
            restored += 1;
        }

        tracing::info!(jobs = restored, "Delivery jobs restored from journal");
        Ok(restored)
    }
}
