//! Background retention reaper.

use crate::types::{Event, JobId};
use chrono::{DateTime, Utc};

use super::MediaGateway;

/// What one reaper pass removed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReapSummary {
    /// Pending jobs failed because their deadline passed
    pub(crate) expired_pending: usize,
    /// Undelivered artifacts reclaimed
    pub(crate) artifacts: usize,
    /// Terminal records without an artifact dropped
    pub(crate) records: usize,
}

impl MediaGateway {
    /// Start the retention reaper task
    ///
    /// Every `reap_interval` it fails overdue pending jobs, reclaims artifacts
    /// nobody fetched within `retention`, and forgets terminal jobs that have
    /// nothing left to deliver. Stops when shutdown begins.
    pub(crate) fn start_reaper(&self) -> tokio::task::JoinHandle<()> {
        let gateway = self.clone();
        let shutdown = self.queue_state.shutdown_token.clone();
        let period = self.config.storage.reap_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let summary = gateway.reap_once(Utc::now()).await;
                        if summary != ReapSummary::default() {
                            tracing::debug!(
                                expired_pending = summary.expired_pending,
                                artifacts = summary.artifacts,
                                records = summary.records,
                                "Reaper pass"
                            );
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }

            tracing::debug!("Reaper stopped");
        })
    }

    /// Run one reaper pass as of `now`
    pub(crate) async fn reap_once(&self, now: DateTime<Utc>) -> ReapSummary {
        let expired_pending = self.expire_pending(now).await;

        let reclaimed = self.store.reap_expired(now);
        let mut reclaimed_jobs: Vec<JobId> = Vec::new();
        {
            let mut jobs = self.lock_jobs();
            for artifact in &reclaimed {
                let held = jobs
                    .get(&artifact.job_id)
                    .and_then(|r| r.artifact.as_ref())
                    .is_some_and(|a| a.id == artifact.id);
                if held {
                    jobs.remove(&artifact.job_id);
                    reclaimed_jobs.push(artifact.job_id);
                }
            }
        }

        for artifact in &reclaimed {
            tracing::info!(
                job_id = %artifact.job_id,
                filename = %artifact.filename,
                "Undelivered artifact reclaimed after retention"
            );
        }
        for id in &reclaimed_jobs {
            self.emit_event(Event::ArtifactReclaimed { id: *id });
        }

        let retention = chrono::Duration::from_std(self.config.storage.retention)
            .unwrap_or(chrono::Duration::MAX);
        let records = {
            let mut jobs = self.lock_jobs();
            let before = jobs.len();
            jobs.retain(|_, record| {
                let stale = record.state.is_terminal()
                    && record.artifact.is_none()
                    && record
                        .finished_at
                        .and_then(|f| f.checked_add_signed(retention))
                        .is_some_and(|expiry| expiry <= now);
                !stale
            });
            before - jobs.len()
        };

        ReapSummary {
            expired_pending,
            artifacts: reclaimed.len(),
            records,
        }
    }
}
