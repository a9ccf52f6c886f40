//! Rollcall server binary: HTTP API and delivery workers in one process.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use rollcall_common::config::AppConfig;
use rollcall_common::db::create_pool;
use rollcall_engine::directory::DirectoryHandle;
use rollcall_engine::journal::{Journal, NullJournal, PgJournal};
use rollcall_engine::store::AttemptStore;
use rollcall_engine::tracker::ActivityGauge;
use rollcall_notifier::pool::WorkerPool;
use rollcall_notifier::transport::TransportRegistry;
use rollcall_notifier::worker::WorkerContext;

use rollcall_api::routes::create_router;
use rollcall_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "rollcall_api=debug,rollcall_engine=debug,rollcall_notifier=debug,tower_http=debug",
            )
        }))
        .init();

    tracing::info!("Starting Rollcall server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    let directory = DirectoryHandle::default();
    let pool = match config.database_url.as_deref() {
        Some(url) => {
            let pool = create_pool(url, config.db_max_connections).await?;
            tracing::info!("Database pool created");

            sqlx::migrate!("../../migrations").run(&pool).await?;
            tracing::info!("Database migrations applied");

            directory.reload(&pool).await?;
            Some(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, jobs are kept in memory only");
            None
        }
    };
    let journal: Arc<dyn Journal> = match &pool {
        Some(pool) => Arc::new(PgJournal::new(pool.clone())),
        None => Arc::new(NullJournal),
    };

    let store = Arc::new(AttemptStore::new());
    let activity = ActivityGauge::new();

    // Build application state
    let state = AppState::new(
        directory,
        store.clone(),
        journal.clone(),
        activity.clone(),
        pool,
        config.clone(),
    );

    // Jobs journaled before the last shutdown, including overdue schedules
    state.jobs.restore().await?;

    // Start delivery workers
    let transports = TransportRegistry::from_config(&config)?;
    let ctx = Arc::new(WorkerContext::new(
        store, journal, transports, activity, &config,
    ));
    let workers = WorkerPool::spawn(config.worker_count, ctx);

    // Build router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Run with graceful shutdown on Ctrl+C
    tokio::select! {
        result = axum::serve(listener, app).into_future() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "API server exited with error");
                workers.shutdown().await;
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    workers.shutdown().await;
    tracing::info!("Rollcall server stopped.");
    Ok(())
}
