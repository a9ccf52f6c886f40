//! Journal: durable record of jobs and attempt transitions.
//!
//! The attempt store is authoritative while the process runs; the journal
//! lets a restarted process rebuild it. A job is journaled before it is
//! published to the store, so workers never act on a job that would be
//! lost on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use rollcall_common::error::AppError;
use rollcall_common::types::{
    AttemptStatus, AudienceSpecification, Channel, DeliveryAttempt, DeliveryJob, JobStatus,
    Payload, Recipient,
};

/// Rows per multi-row insert; keeps each statement well under the bind limit.
const INSERT_CHUNK: usize = 1000;

/// A job and its attempts as read back from the journal.
pub type JournaledJob = (DeliveryJob, Vec<DeliveryAttempt>);

#[async_trait]
pub trait Journal: Send + Sync {
    /// Persist a freshly submitted job with all of its attempts.
    async fn record_job(
        &self,
        job: &DeliveryJob,
        attempts: &[DeliveryAttempt],
    ) -> Result<(), AppError>;

    /// Persist the current state of one attempt.
    async fn record_attempt(&self, attempt: &DeliveryAttempt) -> Result<(), AppError>;

    /// Every journaled job, oldest first.
    async fn load(&self) -> Result<Vec<JournaledJob>, AppError>;
}

/// Journal that keeps nothing; for in-memory deployments and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullJournal;

#[async_trait]
impl Journal for NullJournal {
    async fn record_job(&self, _: &DeliveryJob, _: &[DeliveryAttempt]) -> Result<(), AppError> {
        Ok(())
    }

    async fn record_attempt(&self, _: &DeliveryAttempt) -> Result<(), AppError> {
        Ok(())
    }

    async fn load(&self) -> Result<Vec<JournaledJob>, AppError> {
        Ok(Vec::new())
    }
}

/// PostgreSQL-backed journal (`delivery_jobs` / `delivery_attempts`).
#[derive(Debug, Clone)]
pub struct PgJournal {
    pool: PgPool,
}

impl PgJournal {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    scheduled_at: Option<DateTime<Utc>>,
    audience: Json<AudienceSpecification>,
    payload: Json<Payload>,
    channel: Channel,
    status: JobStatus,
}

#[derive(sqlx::FromRow)]
struct AttemptRow {
    job_id: Uuid,
    recipient_id: String,
    address: String,
    display_name: String,
    status: AttemptStatus,
    attempted_at: Option<DateTime<Utc>>,
    error: Option<String>,
}

#[async_trait]
impl Journal for PgJournal {
    async fn record_job(
        &self,
        job: &DeliveryJob,
        attempts: &[DeliveryAttempt],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO delivery_jobs (id, created_at, scheduled_at, audience, payload, channel, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(job.id)
        .bind(job.created_at)
        .bind(job.scheduled_at)
        .bind(Json(&job.audience))
        .bind(Json(&job.payload))
        .bind(job.channel.to_string())
        .bind(job.status.to_string())
        .execute(&mut *tx)
        .await?;

        for (chunk_index, chunk) in attempts.chunks(INSERT_CHUNK).enumerate() {
            let offset = chunk_index * INSERT_CHUNK;
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO delivery_attempts \
                 (job_id, position, recipient_id, address, display_name, status, attempted_at, error) ",
            );
            builder.push_values(chunk.iter().enumerate(), |mut row, (i, attempt)| {
                row.push_bind(attempt.job_id)
                    .push_bind((offset + i) as i32)
                    .push_bind(&attempt.recipient.id)
                    .push_bind(&attempt.recipient.address)
                    .push_bind(&attempt.recipient.display_name)
                    .push_bind(attempt.status.to_string())
                    .push_bind(attempt.attempted_at)
                    .push_bind(&attempt.error);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        tracing::debug!(job_id = %job.id, attempts = attempts.len(), "Job journaled");
        Ok(())
    }

    async fn record_attempt(&self, attempt: &DeliveryAttempt) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE delivery_attempts
            SET status = $1, attempted_at = $2, error = $3, updated_at = NOW()
            WHERE job_id = $4 AND recipient_id = $5
            "#,
        )
        .bind(attempt.status.to_string())
        .bind(attempt.attempted_at)
        .bind(&attempt.error)
        .bind(attempt.job_id)
        .bind(&attempt.recipient.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load(&self) -> Result<Vec<JournaledJob>, AppError> {
        let jobs: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT id, created_at, scheduled_at, audience, payload, channel, status
            FROM delivery_jobs
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let rows: Vec<AttemptRow> = sqlx::query_as(
            r#"
            SELECT job_id, recipient_id, address, display_name, status, attempted_at, error
            FROM delivery_attempts
            ORDER BY job_id, position
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut attempts: HashMap<Uuid, Vec<DeliveryAttempt>> = HashMap::new();
        for row in rows {
            attempts.entry(row.job_id).or_default().push(DeliveryAttempt {
                job_id: row.job_id,
                recipient: Recipient::new(row.recipient_id, row.address, row.display_name),
                status: row.status,
                attempted_at: row.attempted_at,
                error: row.error,
            });
        }

        let loaded = jobs
            .into_iter()
            .map(|row| {
                let job = DeliveryJob {
                    id: row.id,
                    created_at: row.created_at,
                    scheduled_at: row.scheduled_at,
                    audience: row.audience.0,
                    payload: row.payload.0,
                    channel: row.channel,
                    status: row.status,
                };
                let job_attempts = attempts.remove(&job.id).unwrap_or_default();
                (job, job_attempts)
            })
            .collect();

        Ok(loaded)
    }
}
