//! Job tracker: live delivery counts for the console.
//!
//! Nothing here is stored: every call recounts the attempts' status cells, so
//! the numbers can lag a transition in flight but can never drift from it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use uuid::Uuid;

use rollcall_common::error::AppError;
use rollcall_common::types::{JobStats, QueueStats};

use crate::store::AttemptStore;

/// Counts transport calls currently in flight.
#[derive(Debug, Clone, Default)]
pub struct ActivityGauge {
    in_flight: Arc<AtomicUsize>,
}

impl ActivityGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark one call as started; it ends when the guard drops.
    pub fn begin(&self) -> ActiveGuard {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        ActiveGuard {
            in_flight: self.in_flight.clone(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.in_flight() > 0
    }
}

/// Held by a worker for the duration of one transport call.
#[derive(Debug)]
pub struct ActiveGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Read-side view over the attempt store.
#[derive(Debug, Clone)]
pub struct JobTracker {
    store: Arc<AttemptStore>,
    activity: ActivityGauge,
}

impl JobTracker {
    pub fn new(store: Arc<AttemptStore>, activity: ActivityGauge) -> Self {
        Self { store, activity }
    }

    /// Live counts for one job.
    pub fn stats(&self, job_id: Uuid) -> Result<JobStats, AppError> {
        self.store
            .get(job_id)
            .map(|entry| entry.stats())
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))
    }

    /// Totals across every job plus the activity flag.
    pub fn queue_stats(&self) -> QueueStats {
        let entries = self.store.entries();
        let mut attempts = JobStats::default();
        for entry in &entries {
            attempts.merge(&entry.stats());
        }

        QueueStats {
            jobs: entries.len() as u64,
            attempts,
            processing: self.activity.is_active(),
        }
    }

    /// Whether any worker is in the middle of a send.
    pub fn is_processing(&self) -> bool {
        self.activity.is_active()
    }

    pub fn activity(&self) -> &ActivityGauge {
        &self.activity
    }
}
