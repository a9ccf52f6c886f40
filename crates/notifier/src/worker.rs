//! Delivery worker: claims queued attempts and hands them to a transport.
//!
//! One iteration:
//! 1. Claim the next QUEUED attempt of an eligible job (QUEUED → SENDING)
//!    and journal the claim
//! 2. Call the channel's transport under a hard timeout
//! 3. Record the outcome on the attempt, then mirror it to the journal
//!
//! A send that errors, times out or panics only fails its own attempt; the
//! worker moves on to the next one.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use rollcall_common::config::AppConfig;
use rollcall_common::types::{AttemptStatus, Payload, Recipient};
use rollcall_engine::journal::Journal;
use rollcall_engine::store::AttemptStore;
use rollcall_engine::tracker::ActivityGauge;

use crate::error::TransportError;
use crate::transport::{Transport, TransportRegistry};

/// Everything a worker shares with its siblings.
#[derive(Clone)]
pub struct WorkerContext {
    pub store: Arc<AttemptStore>,
    pub journal: Arc<dyn Journal>,
    pub transports: TransportRegistry,
    pub activity: ActivityGauge,
    /// Idle wait between empty polls.
    pub poll_interval: Duration,
    /// Upper bound on one transport call.
    pub send_timeout: Duration,
}

impl WorkerContext {
    pub fn new(
        store: Arc<AttemptStore>,
        journal: Arc<dyn Journal>,
        transports: TransportRegistry,
        activity: ActivityGauge,
        config: &AppConfig,
    ) -> Self {
        Self {
            store,
            journal,
            transports,
            activity,
            poll_interval: Duration::from_millis(config.worker_poll_interval_ms),
            send_timeout: Duration::from_millis(config.transport_timeout_ms),
        }
    }
}

pub struct DeliveryWorker {
    id: usize,
    ctx: Arc<WorkerContext>,
}

impl DeliveryWorker {
    pub fn new(id: usize, ctx: Arc<WorkerContext>) -> Self {
        Self { id, ctx }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Process one attempt if any is claimable. Returns `false` when idle.
    pub async fn process_next(&self) -> bool {
        let Some(claim) = self.ctx.store.claim_next(Utc::now()) else {
            return false;
        };
        let _active = self.ctx.activity.begin();

        let job_id = claim.job().id;
        let channel = claim.job().channel;
        let recipient = claim.recipient().clone();
        let payload = claim.job().payload.clone();

        // A restart must see this attempt as in flight, not as still queued.
        if let Err(e) = self.ctx.journal.record_attempt(&claim.snapshot()).await {
            tracing::warn!(
                worker = self.id,
                job_id = %job_id,
                recipient_id = %recipient.id,
                error = %e,
                "Failed to journal claimed attempt"
            );
        }

        let (status, error) = match self.ctx.transports.get(channel) {
            Some(transport) => self.send(transport, recipient, payload).await,
            None => (
                AttemptStatus::Failed,
                Some(format!("no transport registered for channel '{}'", channel)),
            ),
        };

        let attempt = match claim.finish(status, error) {
            Ok(attempt) => attempt,
            Err(e) => {
                tracing::error!(
                    worker = self.id,
                    job_id = %job_id,
                    error = %e,
                    "Failed to record delivery outcome"
                );
                return true;
            }
        };

        if attempt.status == AttemptStatus::Failed {
            tracing::warn!(
                worker = self.id,
                job_id = %job_id,
                recipient_id = %attempt.recipient.id,
                error = attempt.error.as_deref().unwrap_or_default(),
                "Delivery attempt failed"
            );
        } else {
            tracing::debug!(
                worker = self.id,
                job_id = %job_id,
                recipient_id = %attempt.recipient.id,
                status = %attempt.status,
                "Delivery attempt finished"
            );
        }

        if let Err(e) = self.ctx.journal.record_attempt(&attempt).await {
            tracing::warn!(
                worker = self.id,
                job_id = %job_id,
                recipient_id = %attempt.recipient.id,
                error = %e,
                "Failed to journal attempt outcome"
            );
        }

        true
    }

    /// Run the transport on its own task so a panic or a hung call stays
    /// contained to this attempt.
    async fn send(
        &self,
        transport: Arc<dyn Transport>,
        recipient: Recipient,
        payload: Payload,
    ) -> (AttemptStatus, Option<String>) {
        let mut handle =
            tokio::spawn(async move { transport.send(&recipient, &payload).await });

        let result = match tokio::time::timeout(self.ctx.send_timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) if join_err.is_panic() => Err(TransportError::Unclassified(
                "transport panicked".to_string(),
            )),
            Ok(Err(join_err)) => Err(TransportError::Unclassified(join_err.to_string())),
            Err(_) => {
                handle.abort();
                Err(TransportError::Timeout)
            }
        };

        match result {
            Ok(outcome) => outcome.into_status(),
            Err(e) => (AttemptStatus::Failed, Some(e.to_string())),
        }
    }

    /// Process attempts until nothing is claimable. Returns how many were
    /// processed.
    pub async fn drain(&self) -> usize {
        let mut processed = 0;
        while self.process_next().await {
            processed += 1;
        }
        processed
    }

    /// Poll for work until `shutdown` flips to `true` or its sender is gone.
    ///
    /// An attempt already claimed is always finished before returning.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(worker = self.id, "Delivery worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            if self.process_next().await {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.ctx.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!(worker = self.id, "Delivery worker stopped");
    }
}
