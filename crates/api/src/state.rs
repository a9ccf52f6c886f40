//! Shared application state for the Axum API server.

use std::sync::Arc;

use sqlx::PgPool;

use rollcall_common::config::AppConfig;
use rollcall_engine::directory::DirectoryHandle;
use rollcall_engine::jobs::JobService;
use rollcall_engine::journal::Journal;
use rollcall_engine::resolver::AudienceResolver;
use rollcall_engine::store::AttemptStore;
use rollcall_engine::tracker::{ActivityGauge, JobTracker};

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub jobs: JobService,
    pub tracker: JobTracker,
    pub directory: DirectoryHandle,
    /// Present only when `DATABASE_URL` is configured.
    pub pool: Option<PgPool>,
    pub config: AppConfig,
}

impl AppState {
    /// Wire the engine around one attempt store. The returned state shares
    /// `store` and `activity` with whatever workers are given the same ones.
    pub fn new(
        directory: DirectoryHandle,
        store: Arc<AttemptStore>,
        journal: Arc<dyn Journal>,
        activity: ActivityGauge,
        pool: Option<PgPool>,
        config: AppConfig,
    ) -> Self {
        let jobs = JobService::new(AudienceResolver::new(directory.clone()), store.clone(), journal);
        let tracker = JobTracker::new(store, activity);

        Self {
            jobs,
            tracker,
            directory,
            pool,
            config,
        }
    }
}
