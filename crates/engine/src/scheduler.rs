//! Scheduler: decides when a job's attempts may be claimed.
//!
//! There is no timer: workers call [`is_eligible`] on every poll, so a job
//! whose time passed while the process was down is picked up on the first
//! poll after start-up.

use chrono::{DateTime, Utc};

use rollcall_common::types::DeliveryJob;

/// Whether `job` may be worked on at `now`.
pub fn is_eligible(job: &DeliveryJob, now: DateTime<Utc>) -> bool {
    is_due(job.scheduled_at, now)
}

/// Eligibility on the raw schedule: unscheduled jobs are always due.
pub fn is_due(scheduled_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    scheduled_at.is_none_or(|at| at <= now)
}
