//! FIFO pending queue and admission.

use crate::error::{ErrorKind, JobFailure};
use crate::types::{Event, JobId, JobState};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::MediaGateway;

impl MediaGateway {
    /// Empty the pending queue, returning the removed IDs in arrival order
    pub(crate) async fn drain_queue(&self) -> Vec<JobId> {
        self.queue_state.queue.lock().await.drain(..).collect()
    }

    /// Pop the oldest pending job and mark it `Running`
    ///
    /// Jobs whose deadline already passed are failed with `Timeout` on the way
    /// and never become `Running`. The queue lock is held until the job's
    /// cancellation token is registered, so a concurrent cancel sees the job
    /// either queued or active.
    pub(crate) async fn admit_next(&self) -> Option<(JobId, CancellationToken)> {
        let mut queue = self.queue_state.queue.lock().await;

        while let Some(id) = queue.pop_front() {
            let now = Utc::now();
            let expired = match self.lock_jobs().get(&id) {
                Some(record) if record.state == JobState::Pending => record.is_expired(now),
                _ => continue,
            };

            if expired {
                self.fail_pending_timeout(id, now);
                continue;
            }

            let token = CancellationToken::new();
            self.queue_state
                .active_jobs
                .lock()
                .await
                .insert(id, token.clone());

            self.update_job(id, |record| {
                record.state = JobState::Running;
                record.started_at = Some(now);
            });

            tracing::info!(job_id = %id, queued = queue.len(), "Job admitted");
            self.emit_event(Event::Started { id });
            return Some((id, token));
        }

        None
    }

    /// Fail every queued job whose deadline has passed at `now`
    ///
    /// Returns the number of jobs failed.
    pub(crate) async fn expire_pending(&self, now: DateTime<Utc>) -> usize {
        let mut queue = self.queue_state.queue.lock().await;

        let expired: Vec<JobId> = {
            let jobs = self.lock_jobs();
            queue
                .iter()
                .copied()
                .filter(|id| jobs.get(id).is_some_and(|r| r.is_expired(now)))
                .collect()
        };

        if expired.is_empty() {
            return 0;
        }

        queue.retain(|id| !expired.contains(id));
        drop(queue);

        for id in &expired {
            self.fail_pending_timeout(*id, now);
        }
        expired.len()
    }

    /// Number of jobs waiting for a slot
    pub(crate) async fn pending_count(&self) -> usize {
        self.queue_state.queue.lock().await.len()
    }

    fn fail_pending_timeout(&self, id: JobId, now: DateTime<Utc>) {
        let failure = JobFailure::new(ErrorKind::Timeout, "deadline passed before the job was admitted");

        self.update_job(id, |record| {
            record.state = JobState::Failed;
            record.finished_at = Some(now);
            record.error = Some(failure.clone());
        });

        tracing::warn!(job_id = %id, "Pending job timed out before admission");
        self.emit_event(Event::Failed {
            id,
            kind: failure.kind,
            message: failure.message,
        });
    }
}
