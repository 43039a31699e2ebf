//! Shutdown coordination.

use crate::error::Result;
use crate::types::Event;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::MediaGateway;

impl MediaGateway {
    /// Gracefully shut down the gateway
    ///
    /// 1. Stops accepting submissions (`submit` returns `ShuttingDown`)
    /// 2. Stops the queue processor and the reaper
    /// 3. Cancels every pending job
    /// 4. Signals every running job and waits up to `shutdown_timeout` for them
    /// 5. Releases every remaining artifact
    ///
    /// The sequence runs once. Concurrent and later calls wait for that run to
    /// finish and return.
    pub async fn shutdown(&self) -> Result<()> {
        self.queue_state
            .shutdown_complete
            .get_or_init(|| self.run_shutdown())
            .await;
        Ok(())
    }

    /// Resolves once shutdown has been initiated, by any caller
    pub async fn shutdown_requested(&self) {
        self.queue_state.shutdown_token.cancelled().await;
    }

    async fn run_shutdown(&self) {
        tracing::info!("Initiating graceful shutdown");

        self.queue_state.accepting_new.store(false, Ordering::SeqCst);
        self.queue_state.shutdown_token.cancel();
        tracing::info!("Stopped accepting new jobs");

        let pending = self.drain_queue().await;
        for id in &pending {
            self.cancel_pending(*id);
        }
        if !pending.is_empty() {
            tracing::info!(count = pending.len(), "Cancelled pending jobs");
        }

        self.cancel_all_active().await;

        let shutdown_timeout = self.config.scheduler.shutdown_timeout;
        match tokio::time::timeout(shutdown_timeout, self.wait_for_active_jobs()).await {
            Ok(()) => tracing::info!("All running jobs stopped"),
            Err(_) => tracing::warn!(
                timeout_ms = shutdown_timeout.as_millis() as u64,
                "Timeout waiting for running jobs to stop, proceeding with shutdown"
            ),
        }

        let released = self.store.release_all().await;
        if released > 0 {
            tracing::info!(released, "Released undelivered artifacts");
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
    }

    /// Signal cancellation to every running job
    async fn cancel_all_active(&self) {
        let active = self.queue_state.active_jobs.lock().await;
        tracing::debug!(active_count = active.len(), "Cancelling running jobs");

        for (id, token) in active.iter() {
            tracing::debug!(job_id = %id, "Signalling cancellation");
            token.cancel();
        }
    }

    /// Wait until no job is running
    async fn wait_for_active_jobs(&self) {
        loop {
            let active_count = self.queue_state.active_jobs.lock().await.len();
            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "Waiting for running jobs to stop");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
