//! Result streaming - hands a finished artifact to a caller exactly once per open.

use crate::error::{ErrorKind, JobError, JobFailure, Result};
use crate::storage::ArtifactReader;
use crate::types::{ArtifactId, Event, JobId, JobState};
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

use super::MediaGateway;

/// A finished artifact being streamed to a caller
///
/// When the stream is exhausted or dropped (caller disconnected), the artifact
/// is released and the job's record is dropped.
pub struct Delivery {
    /// Job being delivered
    pub job_id: JobId,
    /// Filename for `Content-Disposition`
    pub filename: String,
    /// Media type for `Content-Type`
    pub media_type: &'static str,
    /// Size for `Content-Length`
    pub size_bytes: u64,
    reader: ArtifactReader,
    guard: DeliveryGuard,
}

struct DeliveryGuard {
    gateway: MediaGateway,
    job_id: JobId,
    artifact_id: ArtifactId,
    completed: bool,
}

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        self.gateway
            .complete_delivery(self.job_id, self.artifact_id, self.completed);
    }
}

impl Stream for Delivery {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = Pin::new(&mut self.reader).poll_next(cx);
        if let Poll::Ready(None) = polled {
            self.guard.completed = true;
        }
        polled
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("job_id", &self.job_id)
            .field("filename", &self.filename)
            .field("media_type", &self.media_type)
            .field("size_bytes", &self.size_bytes)
            .finish()
    }
}

impl MediaGateway {
    /// Open a job's result for streaming
    ///
    /// # Errors
    ///
    /// - `NotFound` if the job is unknown or was already delivered or reclaimed
    /// - `NotReady` while the job is `pending` or `running`
    /// - `Unsuccessful` (carrying the failure kind) for `failed` and `cancelled` jobs
    pub async fn open_result(&self, id: JobId) -> Result<Delivery> {
        let artifact = {
            let jobs = self.lock_jobs();
            let record = jobs.get(&id).ok_or(JobError::NotFound { id })?;

            match record.state {
                JobState::Succeeded => record.artifact.clone().ok_or(JobError::NotFound { id })?,
                JobState::Failed | JobState::Cancelled => {
                    let failure = record.error.clone().unwrap_or_else(|| {
                        JobFailure::new(ErrorKind::Cancelled, "job was cancelled")
                    });
                    return Err(JobError::Unsuccessful { id, failure }.into());
                }
                JobState::Pending | JobState::Running => {
                    return Err(JobError::NotReady {
                        id,
                        state: record.state.to_string(),
                    }
                    .into());
                }
            }
        };

        let reader = self.store.open(&artifact).await?;

        tracing::info!(
            job_id = %id,
            filename = %artifact.filename,
            size_bytes = artifact.size_bytes,
            "Delivering artifact"
        );

        Ok(Delivery {
            job_id: id,
            filename: artifact.filename.clone(),
            media_type: artifact.media_type(),
            size_bytes: artifact.size_bytes,
            reader,
            guard: DeliveryGuard {
                gateway: self.clone(),
                job_id: id,
                artifact_id: artifact.id,
                completed: false,
            },
        })
    }

    /// Release a delivered artifact and drop its job record
    pub(crate) fn complete_delivery(&self, id: JobId, artifact_id: ArtifactId, completed: bool) {
        self.store.release(artifact_id);

        let removed = {
            let mut jobs = self.lock_jobs();
            let delivered = jobs
                .get(&id)
                .and_then(|r| r.artifact.as_ref())
                .is_some_and(|a| a.id == artifact_id);
            if delivered {
                jobs.remove(&id);
            }
            delivered
        };

        if completed {
            tracing::info!(job_id = %id, "Artifact delivered");
        } else {
            tracing::warn!(job_id = %id, "Caller disconnected mid-stream, artifact released");
        }

        if removed {
            self.emit_event(Event::Delivered { id });
        }
    }
}
