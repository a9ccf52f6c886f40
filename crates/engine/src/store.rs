//! Attempt store: live state of every job and its delivery attempts.
//!
//! Each attempt's status lives in its own `AtomicU8`. Every transition is a
//! compare-and-set from the expected status, so:
//! - two workers can never claim the same attempt (QUEUED → SENDING)
//! - cancellation and claiming race safely (QUEUED → CANCELLED vs SENDING)
//! - stats read the cells without locking and never see a torn update
//!
//! The per-attempt mutex only guards the detail fields (`attempted_at`,
//! `error`) so that snapshots pair a status with the matching detail.
//!
//! Attempts are never removed; the store is the audit trail while the
//! process runs, mirrored to the journal for durability.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use rollcall_common::error::AppError;
use rollcall_common::types::{
    AttemptStatus, DeliveryAttempt, DeliveryJob, JobStats, JobStatus, JobSummary, Recipient,
};

use crate::scheduler;

#[derive(Debug, Default)]
struct SlotDetail {
    attempted_at: Option<DateTime<Utc>>,
    error: Option<String>,
}

#[derive(Debug)]
struct AttemptSlot {
    recipient: Recipient,
    status: AtomicU8,
    detail: Mutex<SlotDetail>,
}

impl AttemptSlot {
    fn new(attempt: DeliveryAttempt) -> Self {
        Self {
            recipient: attempt.recipient,
            status: AtomicU8::new(attempt.status.as_u8()),
            detail: Mutex::new(SlotDetail {
                attempted_at: attempt.attempted_at,
                error: attempt.error,
            }),
        }
    }

    fn status(&self) -> AttemptStatus {
        // Cells are only ever written with valid encodings.
        AttemptStatus::from_u8(self.status.load(Ordering::Acquire))
            .unwrap_or(AttemptStatus::Failed)
    }

    fn lock(&self) -> MutexGuard<'_, SlotDetail> {
        match self.detail.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Atomic compare-and-set of the status cell.
    fn transition(&self, from: AttemptStatus, to: AttemptStatus) -> bool {
        self.status
            .compare_exchange(
                from.as_u8(),
                to.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn snapshot(&self, job_id: Uuid) -> DeliveryAttempt {
        let detail = self.lock();
        DeliveryAttempt {
            job_id,
            recipient: self.recipient.clone(),
            status: self.status(),
            attempted_at: detail.attempted_at,
            error: detail.error.clone(),
        }
    }
}

/// A job together with its attempts.
#[derive(Debug)]
pub struct JobEntry {
    job: DeliveryJob,
    slots: Vec<AttemptSlot>,
    by_recipient: HashMap<String, usize>,
    /// Every slot below this index is known to have left QUEUED.
    next_queued: AtomicUsize,
}

impl JobEntry {
    fn new(job: DeliveryJob, attempts: Vec<DeliveryAttempt>) -> Result<Self, AppError> {
        let mut by_recipient = HashMap::with_capacity(attempts.len());
        let mut slots = Vec::with_capacity(attempts.len());

        for (index, attempt) in attempts.into_iter().enumerate() {
            if attempt.job_id != job.id {
                return Err(AppError::Internal(format!(
                    "Attempt for job {} handed to job {}",
                    attempt.job_id, job.id
                )));
            }
            if by_recipient
                .insert(attempt.recipient.id.clone(), index)
                .is_some()
            {
                return Err(AppError::Internal(format!(
                    "Duplicate attempt for recipient {} in job {}",
                    attempt.recipient.id, job.id
                )));
            }
            slots.push(AttemptSlot::new(attempt));
        }

        Ok(Self {
            job,
            slots,
            by_recipient,
            next_queued: AtomicUsize::new(0),
        })
    }

    pub fn job(&self) -> &DeliveryJob {
        &self.job
    }

    pub fn id(&self) -> Uuid {
        self.job.id
    }

    /// Live counts over this job's attempts.
    pub fn stats(&self) -> JobStats {
        let mut stats = JobStats::default();
        for slot in &self.slots {
            stats.record(slot.status());
        }
        stats
    }

    /// Job status derived from the live attempts.
    pub fn status(&self) -> JobStatus {
        self.stats().job_status()
    }

    pub fn attempts(&self) -> Vec<DeliveryAttempt> {
        self.slots.iter().map(|s| s.snapshot(self.job.id)).collect()
    }

    pub fn attempt(&self, recipient_id: &str) -> Option<DeliveryAttempt> {
        self.by_recipient
            .get(recipient_id)
            .map(|&i| self.slots[i].snapshot(self.job.id))
    }

    pub fn summary(&self) -> JobSummary {
        let stats = self.stats();
        JobSummary {
            id: self.job.id,
            created_at: self.job.created_at,
            scheduled_at: self.job.scheduled_at,
            channel: self.job.channel,
            status: stats.job_status(),
            target_type: self.job.audience.target_type,
            title: self.job.payload.title.clone(),
            stats,
        }
    }

    fn exhausted(&self) -> bool {
        self.next_queued.load(Ordering::Acquire) >= self.slots.len()
    }

    /// Claim any still-queued attempt of this job.
    fn try_claim(&self, now: DateTime<Utc>) -> Option<usize> {
        let mut index = self.next_queued.load(Ordering::Acquire);

        while index < self.slots.len() {
            let slot = &self.slots[index];
            if slot.status() == AttemptStatus::Queued {
                let mut detail = slot.lock();
                if slot.transition(AttemptStatus::Queued, AttemptStatus::Sending) {
                    detail.attempted_at = Some(now);
                    drop(detail);
                    self.next_queued.fetch_max(index + 1, Ordering::AcqRel);
                    return Some(index);
                }
            }
            index += 1;
        }

        self.next_queued.fetch_max(index, Ordering::AcqRel);
        None
    }
}

/// An attempt a worker has exclusively claimed (status SENDING).
///
/// Dropping a claim without finishing it leaves the attempt in SENDING.
#[derive(Debug)]
pub struct ClaimedAttempt {
    entry: Arc<JobEntry>,
    index: usize,
}

impl ClaimedAttempt {
    pub fn job(&self) -> &DeliveryJob {
        &self.entry.job
    }

    pub fn recipient(&self) -> &Recipient {
        &self.entry.slots[self.index].recipient
    }

    /// The attempt as claimed, for journaling before the send starts.
    pub fn snapshot(&self) -> DeliveryAttempt {
        self.entry.slots[self.index].snapshot(self.entry.job.id)
    }

    /// Record the outcome of the send.
    ///
    /// `status` must be one of SENT, DELIVERED, FAILED or BOUNCED.
    pub fn finish(
        self,
        status: AttemptStatus,
        error: Option<String>,
    ) -> Result<DeliveryAttempt, AppError> {
        if !matches!(
            status,
            AttemptStatus::Sent
                | AttemptStatus::Delivered
                | AttemptStatus::Failed
                | AttemptStatus::Bounced
        ) {
            return Err(AppError::Internal(format!(
                "'{}' is not a send outcome",
                status
            )));
        }

        let slot = &self.entry.slots[self.index];
        let mut detail = slot.lock();
        if !slot.transition(AttemptStatus::Sending, status) {
            return Err(AppError::Internal(format!(
                "Attempt for {} in job {} left SENDING while claimed",
                slot.recipient.id, self.entry.job.id
            )));
        }
        detail.error = error;
        drop(detail);

        Ok(slot.snapshot(self.entry.job.id))
    }
}

#[derive(Debug, Default)]
struct Jobs {
    order: Vec<Arc<JobEntry>>,
    by_id: HashMap<Uuid, Arc<JobEntry>>,
}

/// In-memory store of jobs and attempts shared by the API and the workers.
#[derive(Debug, Default)]
pub struct AttemptStore {
    jobs: RwLock<Jobs>,
    cursor: AtomicUsize,
}

impl AttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Jobs> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Publish a job and its attempts. The job becomes claimable immediately
    /// (subject to its schedule).
    pub fn insert(
        &self,
        job: DeliveryJob,
        attempts: Vec<DeliveryAttempt>,
    ) -> Result<Arc<JobEntry>, AppError> {
        let entry = Arc::new(JobEntry::new(job, attempts)?);

        let mut jobs = match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if jobs.by_id.contains_key(&entry.id()) {
            return Err(AppError::Internal(format!(
                "Job {} already exists",
                entry.id()
            )));
        }
        jobs.by_id.insert(entry.id(), entry.clone());
        jobs.order.push(entry.clone());

        Ok(entry)
    }

    pub fn get(&self, job_id: Uuid) -> Option<Arc<JobEntry>> {
        self.read().by_id.get(&job_id).cloned()
    }

    /// All jobs, oldest first.
    pub fn entries(&self) -> Vec<Arc<JobEntry>> {
        self.read().order.clone()
    }

    pub fn job_count(&self) -> usize {
        self.read().order.len()
    }

    /// Claim one queued attempt from an eligible job.
    ///
    /// Jobs are visited round-robin, starting one further along on every
    /// call, so a large job cannot starve the ones behind it.
    pub fn claim_next(&self, now: DateTime<Utc>) -> Option<ClaimedAttempt> {
        let jobs = self.read();
        let count = jobs.order.len();
        if count == 0 {
            return None;
        }

        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % count;
        for offset in 0..count {
            let entry = &jobs.order[(start + offset) % count];
            if entry.exhausted() || !scheduler::is_eligible(&entry.job, now) {
                continue;
            }
            if let Some(index) = entry.try_claim(now) {
                return Some(ClaimedAttempt {
                    entry: entry.clone(),
                    index,
                });
            }
        }

        None
    }

    /// Cancel every attempt of `job_id` that is still QUEUED.
    ///
    /// Attempts already claimed or finished are left alone. Returns the
    /// cancelled attempts, or `AlreadyDispatched` when nothing was queued.
    pub fn cancel(&self, job_id: Uuid) -> Result<Vec<DeliveryAttempt>, AppError> {
        let entry = self
            .get(job_id)
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;

        let mut cancelled = Vec::new();
        for slot in &entry.slots {
            if slot.status() != AttemptStatus::Queued {
                continue;
            }
            let detail = slot.lock();
            if slot.transition(AttemptStatus::Queued, AttemptStatus::Cancelled) {
                drop(detail);
                cancelled.push(slot.snapshot(job_id));
            }
        }

        if cancelled.is_empty() {
            return Err(AppError::AlreadyDispatched(format!(
                "Job {} has no queued attempts left",
                job_id
            )));
        }

        Ok(cancelled)
    }

    /// Refine a SENT attempt with a provider's later report.
    pub fn record_receipt(
        &self,
        job_id: Uuid,
        recipient_id: &str,
        status: AttemptStatus,
        detail: Option<String>,
    ) -> Result<DeliveryAttempt, AppError> {
        if !matches!(status, AttemptStatus::Delivered | AttemptStatus::Bounced) {
            return Err(AppError::Validation(format!(
                "Receipts may only report delivered or bounced, not '{}'",
                status
            )));
        }

        let entry = self
            .get(job_id)
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;
        let index = *entry.by_recipient.get(recipient_id).ok_or_else(|| {
            AppError::NotFound(format!(
                "Recipient {} is not part of job {}",
                recipient_id, job_id
            ))
        })?;

        let slot = &entry.slots[index];
        let mut guard = slot.lock();
        if !slot.transition(AttemptStatus::Sent, status) {
            let current = slot.status();
            return Err(AppError::AlreadyDispatched(format!(
                "Attempt for {} is '{}', not awaiting a receipt",
                recipient_id, current
            )));
        }
        if detail.is_some() {
            guard.error = detail;
        }
        drop(guard);

        Ok(slot.snapshot(job_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rollcall_common::types::{AudienceSpecification, Channel, Payload};
    use std::collections::HashSet;

    fn job_with(n: usize, scheduled_at: Option<DateTime<Utc>>) -> (DeliveryJob, Vec<DeliveryAttempt>) {
        let mut job = DeliveryJob::draft(
            AudienceSpecification::all(),
            Payload::new("Hi", "There"),
            Channel::Email,
            scheduled_at,
        );
        job.status = JobStatus::Queued;
        let attempts = (0..n)
            .map(|i| {
                DeliveryAttempt::queued(
                    job.id,
                    Recipient::new(format!("r{}", i), format!("r{}@x.com", i), format!("R{}", i)),
                )
            })
            .collect();
        (job, attempts)
    }

    #[test]
    fn test_claim_moves_attempt_to_sending() {
        let store = AttemptStore::new();
        let (job, attempts) = job_with(1, None);
        let entry = store.insert(job, attempts).unwrap();

        let claim = store.claim_next(Utc::now()).unwrap();
        assert_eq!(claim.recipient().id, "r0");
        assert_eq!(entry.stats().sending, 1);
        assert!(entry.attempt("r0").unwrap().attempted_at.is_some());

        let snapshot = claim.snapshot();
        assert_eq!(snapshot.job_id, entry.id());
        assert_eq!(snapshot.status, AttemptStatus::Sending);
        assert!(snapshot.attempted_at.is_some());

        assert!(store.claim_next(Utc::now()).is_none());
    }

    #[test]
    fn test_finish_records_outcome() {
        let store = AttemptStore::new();
        let (job, attempts) = job_with(1, None);
        let entry = store.insert(job, attempts).unwrap();

        let claim = store.claim_next(Utc::now()).unwrap();
        let attempt = claim
            .finish(AttemptStatus::Failed, Some("rejected".to_string()))
            .unwrap();

        assert_eq!(attempt.status, AttemptStatus::Failed);
        assert_eq!(attempt.error.as_deref(), Some("rejected"));
        assert_eq!(entry.stats().failed, 1);
        assert_eq!(entry.status(), JobStatus::Completed);
    }

    #[test]
    fn test_finish_rejects_non_outcome() {
        let store = AttemptStore::new();
        let (job, attempts) = job_with(1, None);
        store.insert(job, attempts).unwrap();

        let claim = store.claim_next(Utc::now()).unwrap();
        assert!(claim.finish(AttemptStatus::Queued, None).is_err());
    }

    #[test]
    fn test_scheduled_job_not_claimed_early() {
        let store = AttemptStore::new();
        let now = Utc::now();
        let (job, attempts) = job_with(2, Some(now + Duration::hours(1)));
        store.insert(job, attempts).unwrap();

        assert!(store.claim_next(now).is_none());
        assert!(store.claim_next(now + Duration::hours(1)).is_some());
    }

    #[test]
    fn test_claims_rotate_between_jobs() {
        let store = AttemptStore::new();
        let (big, big_attempts) = job_with(50, None);
        let (small, small_attempts) = job_with(2, None);
        let big_id = big.id;
        let small_id = small.id;
        store.insert(big, big_attempts).unwrap();
        store.insert(small, small_attempts).unwrap();

        let now = Utc::now();
        let first_four: Vec<Uuid> = (0..4)
            .map(|_| store.claim_next(now).unwrap().job().id)
            .collect();

        assert_eq!(first_four.iter().filter(|id| **id == small_id).count(), 2);
        assert_eq!(first_four.iter().filter(|id| **id == big_id).count(), 2);
    }

    #[test]
    fn test_racing_claims_never_share_an_attempt() {
        let store = Arc::new(AttemptStore::new());
        let (job, attempts) = job_with(200, None);
        store.insert(job, attempts).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let mut mine = Vec::new();
                    while let Some(claim) = store.claim_next(Utc::now()) {
                        mine.push(claim.recipient().id.clone());
                        claim.finish(AttemptStatus::Sent, None).unwrap();
                    }
                    mine
                })
            })
            .collect();

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }
        let unique: HashSet<&String> = all.iter().collect();
        assert_eq!(all.len(), 200);
        assert_eq!(unique.len(), 200);
    }

    #[test]
    fn test_single_attempt_race_has_one_winner() {
        for _ in 0..50 {
            let store = Arc::new(AttemptStore::new());
            let (job, attempts) = job_with(1, None);
            store.insert(job, attempts).unwrap();

            let barrier = Arc::new(std::sync::Barrier::new(2));
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let store = store.clone();
                    let barrier = barrier.clone();
                    std::thread::spawn(move || {
                        barrier.wait();
                        store.claim_next(Utc::now()).is_some()
                    })
                })
                .collect();

            let winners = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|won| *won)
                .count();
            assert_eq!(winners, 1);
        }
    }

    #[test]
    fn test_cancel_only_touches_queued() {
        let store = AttemptStore::new();
        let (job, attempts) = job_with(3, None);
        let job_id = job.id;
        let entry = store.insert(job, attempts).unwrap();

        let now = Utc::now();
        store
            .claim_next(now)
            .unwrap()
            .finish(AttemptStatus::Sent, None)
            .unwrap();
        let _in_flight = store.claim_next(now).unwrap();

        let cancelled = store.cancel(job_id).unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].status, AttemptStatus::Cancelled);

        let stats = entry.stats();
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.sending, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.queued, 0);
    }

    #[test]
    fn test_cancel_without_queued_is_already_dispatched() {
        let store = AttemptStore::new();
        let (job, attempts) = job_with(1, None);
        let job_id = job.id;
        store.insert(job, attempts).unwrap();
        store
            .claim_next(Utc::now())
            .unwrap()
            .finish(AttemptStatus::Sent, None)
            .unwrap();

        assert!(matches!(
            store.cancel(job_id),
            Err(AppError::AlreadyDispatched(_))
        ));
    }

    #[test]
    fn test_cancel_unknown_job() {
        let store = AttemptStore::new();
        assert!(matches!(
            store.cancel(Uuid::new_v4()),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_cancelled_attempts_are_never_claimed() {
        let store = AttemptStore::new();
        let (job, attempts) = job_with(5, None);
        let job_id = job.id;
        store.insert(job, attempts).unwrap();

        store.cancel(job_id).unwrap();
        assert!(store.claim_next(Utc::now()).is_none());
    }

    #[test]
    fn test_receipt_refines_sent_only() {
        let store = AttemptStore::new();
        let (job, attempts) = job_with(2, None);
        let job_id = job.id;
        let entry = store.insert(job, attempts).unwrap();

        let claim = store.claim_next(Utc::now()).unwrap();
        let sent_id = claim.recipient().id.clone();
        claim.finish(AttemptStatus::Sent, None).unwrap();

        let bounced = store
            .record_receipt(job_id, &sent_id, AttemptStatus::Bounced, Some("mailbox full".into()))
            .unwrap();
        assert_eq!(bounced.status, AttemptStatus::Bounced);
        assert_eq!(bounced.error.as_deref(), Some("mailbox full"));
        assert_eq!(entry.stats().bounced, 1);

        // Already bounced: no further receipts
        assert!(matches!(
            store.record_receipt(job_id, &sent_id, AttemptStatus::Delivered, None),
            Err(AppError::AlreadyDispatched(_))
        ));

        // Still queued: nothing to refine
        let other = if sent_id == "r0" { "r1" } else { "r0" };
        assert!(matches!(
            store.record_receipt(job_id, other, AttemptStatus::Delivered, None),
            Err(AppError::AlreadyDispatched(_))
        ));

        assert!(matches!(
            store.record_receipt(job_id, "nobody", AttemptStatus::Delivered, None),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            store.record_receipt(job_id, other, AttemptStatus::Failed, None),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_insert_rejects_duplicate_recipients() {
        let store = AttemptStore::new();
        let (job, mut attempts) = job_with(1, None);
        attempts.push(attempts[0].clone());

        assert!(store.insert(job, attempts).is_err());
        assert_eq!(store.job_count(), 0);
    }
}
