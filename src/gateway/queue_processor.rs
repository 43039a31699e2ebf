//! Queue processor - admits pending jobs into free slots and spawns runners.

use super::MediaGateway;

impl MediaGateway {
    /// Start the queue processor task
    ///
    /// Loops until shutdown:
    /// 1. Acquires a slot permit (at most `max_concurrent_jobs` are held)
    /// 2. Admits the oldest pending job, waiting for a submission if the queue is empty
    /// 3. Spawns a runner that holds the permit until the job is terminal
    ///
    /// Taking the permit before popping keeps jobs queued, and thus cancellable
    /// as pending, until a slot is actually free.
    pub(crate) fn start_queue_processor(&self) -> tokio::task::JoinHandle<()> {
        let gateway = self.clone();
        let concurrent_limit = self.queue_state.concurrent_limit.clone();
        let job_added = self.queue_state.job_added.clone();
        let shutdown = self.queue_state.shutdown_token.clone();

        tokio::spawn(async move {
            loop {
                let permit = tokio::select! {
                    permit = concurrent_limit.clone().acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => break,
                    },
                    _ = shutdown.cancelled() => break,
                };

                let admitted = loop {
                    if let Some(admitted) = gateway.admit_next().await {
                        break Some(admitted);
                    }
                    tokio::select! {
                        _ = job_added.notified() => {}
                        _ = shutdown.cancelled() => break None,
                    }
                };

                let Some((id, cancel_token)) = admitted else {
                    break;
                };

                let runner = gateway.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    runner.run_job(id, cancel_token).await;
                });
            }

            tracing::debug!("Queue processor stopped");
        })
    }
}
