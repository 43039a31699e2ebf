//! Job control - submit, cancel, inspect.

use crate::error::{Error, JobError, Result};
use crate::types::{Event, JobId, JobInfo, JobRequest, JobState, MediaMetadata, Quality, QueueStats};
use chrono::Utc;
use std::sync::atomic::Ordering;

use super::{JobRecord, MediaGateway};

impl MediaGateway {
    /// Submit a job
    ///
    /// The job is created `Pending` and queued FIFO; the queue processor admits
    /// it as soon as a slot is free. The URL itself is checked by the fetcher
    /// when the job runs, so a malformed URL yields a `Failed` job with kind
    /// `invalid_url` rather than a rejected submission.
    ///
    /// # Errors
    ///
    /// No job is created when:
    /// - shutdown has begun (`ShuttingDown`)
    /// - the quality hint or timeout is malformed (`InvalidRequest`)
    /// - the artifact store is at capacity (`StorageExhausted`)
    /// - the pending queue is at its bound (`QueueFull`)
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use media_dl::*;
    /// # async fn example(gateway: MediaGateway) -> Result<()> {
    /// let job = gateway
    ///     .submit(JobRequest::new("https://example.com/v1", MediaKind::Video).with_quality("1080p"))
    ///     .await?;
    /// println!("queued job {}", job.id);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn submit(&self, request: JobRequest) -> Result<JobInfo> {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let max_height = match &request.quality {
            Some(hint) => Quality::parse_hint(hint)
                .map_err(|message| Error::InvalidRequest {
                    field: "quality".to_string(),
                    message,
                })?
                .map(|q| q.max_height()),
            None => None,
        }
        .unwrap_or(self.config.fetcher.default_max_height);

        let timeout = match request.timeout_secs {
            Some(0) => {
                return Err(Error::InvalidRequest {
                    field: "timeout_secs".to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
            Some(secs) => Some(std::time::Duration::from_secs(secs)),
            None => self.config.scheduler.job_timeout,
        };

        self.store.check_capacity()?;

        let mut queue = self.queue_state.queue.lock().await;
        // Shutdown drains the queue under this lock
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        let capacity = self.config.scheduler.max_pending_jobs;
        if queue.len() >= capacity {
            tracing::warn!(capacity, "Submission rejected: pending queue full");
            return Err(Error::QueueFull { capacity });
        }

        let id = JobId(self.queue_state.next_job_id.fetch_add(1, Ordering::SeqCst));
        let now = Utc::now();
        let deadline = timeout
            .and_then(|t| chrono::Duration::from_std(t).ok())
            .map(|t| now + t);

        let record = JobRecord {
            id,
            url: request.url.trim().to_string(),
            kind: request.kind,
            max_height,
            state: JobState::Pending,
            title: None,
            attempts: 0,
            created_at: now,
            started_at: None,
            finished_at: None,
            deadline,
            error: None,
            artifact: None,
        };
        let info = record.info();

        self.lock_jobs().insert(id, record);
        queue.push_back(id);
        let queued = queue.len();
        drop(queue);
        self.queue_state.job_added.notify_one();

        tracing::info!(
            job_id = %id,
            url = %info.url,
            kind = %info.kind,
            max_height,
            queued,
            "Job queued"
        );
        self.emit_event(Event::Queued {
            id,
            url: info.url.clone(),
        });

        Ok(info)
    }

    /// Cancel a job
    ///
    /// A pending job is removed from the queue and marked `Cancelled` at once.
    /// A running job is signalled and reaches `Cancelled` within the cancel
    /// grace period.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown (or already delivered) jobs, `InvalidState` for
    /// jobs that are already terminal.
    pub async fn cancel(&self, id: JobId) -> Result<()> {
        {
            // Holding the queue lock keeps the processor from admitting `id` meanwhile
            let mut queue = self.queue_state.queue.lock().await;
            if let Some(pos) = queue.iter().position(|queued| *queued == id) {
                queue.remove(pos);
                drop(queue);
                self.cancel_pending(id);
                return Ok(());
            }

            let active = self.queue_state.active_jobs.lock().await;
            if let Some(token) = active.get(&id) {
                tracing::info!(job_id = %id, "Cancelling running job");
                token.cancel();
                return Ok(());
            }
        }

        let state = self.lock_jobs().get(&id).map(|r| r.state);
        match state {
            None => Err(JobError::NotFound { id }.into()),
            // Finishing right now; its runner records the outcome
            Some(JobState::Running) => Ok(()),
            Some(state) => Err(JobError::InvalidState {
                id,
                operation: "cancel".to_string(),
                current_state: state.to_string(),
            }
            .into()),
        }
    }

    /// Get a job's current info
    pub fn get_job(&self, id: JobId) -> Result<JobInfo> {
        self.lock_jobs()
            .get(&id)
            .map(JobRecord::info)
            .ok_or_else(|| JobError::NotFound { id }.into())
    }

    /// All retained jobs, oldest first
    pub fn list_jobs(&self) -> Vec<JobInfo> {
        let mut jobs: Vec<JobInfo> = self.lock_jobs().values().map(JobRecord::info).collect();
        jobs.sort_by_key(|j| j.id);
        jobs
    }

    /// Job counts by state plus storage usage
    pub async fn queue_stats(&self) -> QueueStats {
        let pending = self.pending_count().await;
        let storage = self.store.stats();

        let mut stats = QueueStats {
            pending,
            max_concurrent_jobs: self.config.scheduler.max_concurrent_jobs,
            max_pending_jobs: self.config.scheduler.max_pending_jobs,
            storage_used_bytes: storage.used_bytes,
            storage_capacity_bytes: storage.capacity_bytes,
            ..QueueStats::default()
        };

        for record in self.lock_jobs().values() {
            match record.state {
                JobState::Pending => {}
                JobState::Running => stats.running += 1,
                JobState::Succeeded => stats.succeeded += 1,
                JobState::Failed => stats.failed += 1,
                JobState::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// Title and available qualities for a URL, straight from the backend
    pub async fn metadata(&self, url: &str) -> Result<MediaMetadata> {
        Ok(self.fetcher.metadata(url).await?)
    }

    pub(crate) fn cancel_pending(&self, id: JobId) {
        self.update_job(id, |record| {
            record.state = JobState::Cancelled;
            record.finished_at = Some(Utc::now());
            record.error = Some(crate::error::JobFailure::new(
                crate::error::ErrorKind::Cancelled,
                "job was cancelled before it started",
            ));
        });
        tracing::info!(job_id = %id, "Pending job cancelled");
        self.emit_event(Event::Cancelled { id });
    }
}
