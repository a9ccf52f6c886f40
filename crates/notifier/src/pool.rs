use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::worker::{DeliveryWorker, WorkerContext};

/// A fixed set of delivery workers sharing one context.
pub struct WorkerPool {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers (at least one) on the current runtime.
    pub fn spawn(count: usize, ctx: Arc<WorkerContext>) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let count = count.max(1);

        let handles = (0..count)
            .map(|id| tokio::spawn(DeliveryWorker::new(id, ctx.clone()).run(rx.clone())))
            .collect();

        tracing::info!(workers = count, "Delivery worker pool started");
        Self { shutdown, handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Signal every worker and wait for in-flight attempts to finish.
    pub async fn shutdown(self) {
        // Receivers only disappear once their workers have exited.
        let _ = self.shutdown.send(true);

        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Delivery worker ended abnormally");
            }
        }

        tracing::info!("Delivery worker pool stopped");
    }
}
