//! Job runner - drives one admitted job to `Succeeded`, `Failed` or `Cancelled`.

use crate::error::{ErrorKind, JobFailure};
use crate::fetcher::{AttemptError, FetchRequest};
use crate::retry::retry_with_backoff;
use crate::storage::Artifact;
use crate::types::{Event, JobId, JobState, MediaKind};
use chrono::Utc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::MediaGateway;

/// Why the runner stopped waiting on the attempt
enum Stop {
    Finished(RunOutcome),
    Cancelled,
    TimedOut,
}

/// How a run ended, before it is recorded
enum RunOutcome {
    Succeeded(Artifact),
    Failed(JobFailure),
    Cancelled,
    TimedOut,
}

impl MediaGateway {
    /// Run an admitted job to a terminal state
    ///
    /// Cancellation and deadline expiry both abandon the in-flight attempt: the
    /// attempt gets `cancel_grace` to unwind, then is dropped, which discards its
    /// partial artifact.
    pub(crate) async fn run_job(&self, id: JobId, cancel: CancellationToken) {
        let snapshot = self
            .lock_jobs()
            .get(&id)
            .map(|r| (r.url.clone(), r.kind, r.max_height, r.deadline));
        let Some((url, kind, max_height, deadline)) = snapshot else {
            tracing::warn!(job_id = %id, "Admitted job has no record");
            self.queue_state.active_jobs.lock().await.remove(&id);
            return;
        };

        tracing::info!(job_id = %id, url = %url, kind = %kind, max_height, "Job started");

        let until_deadline = deadline.map(|d| (d - Utc::now()).to_std().unwrap_or(Duration::ZERO));
        let deadline_expired = async {
            match until_deadline {
                Some(wait) => tokio::time::sleep(wait).await,
                None => std::future::pending::<()>().await,
            }
        };

        let work = self.execute(id, url, kind, max_height, cancel.clone());
        tokio::pin!(work);
        tokio::pin!(deadline_expired);

        let stop = tokio::select! {
            biased;
            _ = cancel.cancelled() => Stop::Cancelled,
            _ = &mut deadline_expired => Stop::TimedOut,
            result = &mut work => Stop::Finished(match result {
                Ok(artifact) => RunOutcome::Succeeded(artifact),
                Err(e) => match e.failure() {
                    Some(failure) => RunOutcome::Failed(failure),
                    None => RunOutcome::Cancelled,
                },
            }),
        };

        let outcome = match stop {
            Stop::Finished(outcome) => outcome,
            Stop::Cancelled => {
                self.abandon(id, &mut work).await;
                RunOutcome::Cancelled
            }
            Stop::TimedOut => {
                tracing::warn!(job_id = %id, "Job deadline exceeded");
                cancel.cancel();
                self.abandon(id, &mut work).await;
                RunOutcome::TimedOut
            }
        };

        self.finish_job(id, outcome);
        self.queue_state.active_jobs.lock().await.remove(&id);
    }

    /// Give an abandoned attempt `cancel_grace` to unwind, then drop it
    async fn abandon<F>(&self, id: JobId, work: &mut std::pin::Pin<&mut F>)
    where
        F: std::future::Future<Output = Result<Artifact, AttemptError>>,
    {
        let grace = self.config.fetcher.cancel_grace;
        match tokio::time::timeout(grace, work.as_mut()).await {
            Ok(Ok(artifact)) => {
                // Finished inside the grace window but the job no longer wants it
                self.store.release(artifact.id);
            }
            Ok(Err(_)) => {}
            Err(_) => {
                tracing::warn!(
                    job_id = %id,
                    grace_ms = grace.as_millis() as u64,
                    "Fetch did not stop within grace period, abandoning"
                );
            }
        }
    }

    /// All attempts for one job, retrying transient failures
    async fn execute(
        &self,
        id: JobId,
        url: String,
        kind: MediaKind,
        max_height: u32,
        cancel: CancellationToken,
    ) -> Result<Artifact, AttemptError> {
        retry_with_backoff(
            &self.config.retry,
            &cancel,
            |attempt, delay, e: &AttemptError| {
                self.emit_event(Event::Retrying {
                    id,
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    error: e.to_string(),
                });
            },
            |attempt| {
                let request = FetchRequest::new(id, attempt, url.clone(), kind, max_height);
                let cancel = cancel.clone();
                async move { self.attempt(request, &cancel).await }
            },
        )
        .await
    }

    /// One attempt: fresh writer, fetch, seal
    ///
    /// Any early return drops the writer, which discards its partial output.
    async fn attempt(&self, request: FetchRequest, cancel: &CancellationToken) -> Result<Artifact, AttemptError> {
        let id = request.job_id;
        self.update_job(id, |record| record.attempts = request.attempt);

        let mut writer = self.store.create(id, request.kind).await?;

        let event_tx = self.event_tx.clone();
        let outcome = self
            .fetcher
            .fetch(&request, &mut writer, cancel, |bytes| {
                event_tx.send(Event::Progress { id, bytes }).ok();
            })
            .await?;

        let artifact = self.store.seal(writer, &outcome.title).await?;
        self.update_job(id, |record| record.title = Some(outcome.title));
        Ok(artifact)
    }

    /// Record the terminal state and announce it
    fn finish_job(&self, id: JobId, outcome: RunOutcome) {
        let now = Utc::now();

        let (state, failure, artifact) = match outcome {
            RunOutcome::Succeeded(artifact) => (JobState::Succeeded, None, Some(artifact)),
            RunOutcome::Failed(failure) => (JobState::Failed, Some(failure), None),
            RunOutcome::TimedOut => (
                JobState::Failed,
                Some(JobFailure::new(ErrorKind::Timeout, "job deadline exceeded")),
                None,
            ),
            RunOutcome::Cancelled => (
                JobState::Cancelled,
                Some(JobFailure::new(ErrorKind::Cancelled, "job was cancelled")),
                None,
            ),
        };

        let recorded = {
            let mut jobs = self.lock_jobs();
            match jobs.get_mut(&id) {
                Some(record) => {
                    record.state = state;
                    record.finished_at = Some(now);
                    record.error = failure.clone();
                    record.artifact = artifact.clone();
                    true
                }
                None => false,
            }
        };

        if !recorded {
            if let Some(artifact) = &artifact {
                self.store.release(artifact.id);
            }
            tracing::warn!(job_id = %id, "Job record vanished before completion");
            return;
        }

        match (state, failure, artifact) {
            (JobState::Succeeded, _, Some(artifact)) => {
                tracing::info!(
                    job_id = %id,
                    filename = %artifact.filename,
                    size_bytes = artifact.size_bytes,
                    "Job succeeded"
                );
                self.emit_event(Event::Succeeded {
                    id,
                    filename: artifact.filename,
                    size_bytes: artifact.size_bytes,
                });
            }
            (JobState::Cancelled, _, _) => {
                tracing::info!(job_id = %id, "Job cancelled");
                self.emit_event(Event::Cancelled { id });
            }
            (_, Some(failure), _) => {
                tracing::error!(
                    job_id = %id,
                    kind = %failure.kind,
                    error = %failure.message,
                    "Job failed"
                );
                self.emit_event(Event::Failed {
                    id,
                    kind: failure.kind,
                    message: failure.message,
                });
            }
            _ => {}
        }
    }
}
