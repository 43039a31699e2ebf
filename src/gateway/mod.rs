//! Core gateway implementation split into focused submodules.
//!
//! The `MediaGateway` struct and its methods are organized by concern:
//! - [`queue`] - FIFO pending queue and admission
//! - [`queue_processor`] - Slot-bounded admission loop
//! - [`runner`] - Drives one job from `Running` to a terminal state
//! - [`control`] - Submit, cancel, inspect
//! - [`delivery`] - Streaming finished artifacts to callers
//! - [`background_tasks`] - Retention reaper
//! - [`lifecycle`] - Shutdown coordination

mod background_tasks;
mod control;
mod delivery;
mod lifecycle;
mod queue;
mod queue_processor;
mod runner;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use delivery::Delivery;

use crate::config::Config;
use crate::error::{JobFailure, Result};
use crate::fetcher::{Fetcher, MediaBackend, YtDlpBackend};
use crate::storage::{Artifact, ArtifactStore};
use crate::types::{Capabilities, Event, JobId, JobInfo, JobState, MediaKind};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Event channel capacity; slower subscribers see `RecvError::Lagged`
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Queue and admission state
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Pending job IDs in arrival order
    pub(crate) queue: Arc<tokio::sync::Mutex<VecDeque<JobId>>>,
    /// Semaphore limiting concurrently running jobs
    pub(crate) concurrent_limit: Arc<tokio::sync::Semaphore>,
    /// Cancellation tokens of running jobs
    pub(crate) active_jobs: Arc<tokio::sync::Mutex<HashMap<JobId, CancellationToken>>>,
    /// Cleared when shutdown begins
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Wakes the queue processor when a job is enqueued
    pub(crate) job_added: Arc<tokio::sync::Notify>,
    /// Stops the queue processor and the reaper
    pub(crate) shutdown_token: CancellationToken,
    /// Next job ID
    pub(crate) next_job_id: Arc<AtomicU64>,
    /// Set once the shutdown sequence has run to completion
    pub(crate) shutdown_complete: Arc<tokio::sync::OnceCell<()>>,
}

/// A job's mutable record in the job table
#[derive(Clone, Debug)]
pub(crate) struct JobRecord {
    pub(crate) id: JobId,
    pub(crate) url: String,
    pub(crate) kind: MediaKind,
    pub(crate) max_height: u32,
    pub(crate) state: JobState,
    pub(crate) title: Option<String>,
    pub(crate) attempts: u32,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) finished_at: Option<DateTime<Utc>>,
    pub(crate) deadline: Option<DateTime<Utc>>,
    pub(crate) error: Option<JobFailure>,
    pub(crate) artifact: Option<Artifact>,
}

impl JobRecord {
    pub(crate) fn info(&self) -> JobInfo {
        JobInfo {
            id: self.id,
            url: self.url.clone(),
            kind: self.kind,
            max_height: self.max_height,
            state: self.state,
            title: self.title.clone(),
            attempts: self.attempts,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            deadline: self.deadline,
            error: self.error.clone(),
            artifact: self.artifact.as_ref().map(Artifact::info),
        }
    }

    /// Whether a deadline exists and has passed at `now`
    pub(crate) fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|d| d <= now)
    }
}

/// Main gateway instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct MediaGateway {
    /// Job table; never held across an await
    pub(crate) jobs: Arc<Mutex<HashMap<JobId, JobRecord>>>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration
    pub(crate) config: Arc<Config>,
    /// Adapter over the media backend
    pub(crate) fetcher: Fetcher,
    /// Artifact buffers
    pub(crate) store: ArtifactStore,
    /// Queue and admission state
    pub(crate) queue_state: QueueState,
}

impl MediaGateway {
    /// Create a gateway backed by `yt-dlp`
    ///
    /// Validates the configuration, prepares the artifact store, locates the
    /// `yt-dlp` binary, then starts the queue processor and the retention reaper.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let backend = YtDlpBackend::from_config(&config.fetcher)?;
        tracing::info!(
            binary = %backend.binary_path().display(),
            "yt-dlp backend initialized"
        );
        Self::with_backend(config, Arc::new(backend)).await
    }

    /// Create a gateway over any [`MediaBackend`]
    pub async fn with_backend(config: Config, backend: Arc<dyn MediaBackend>) -> Result<Self> {
        config.validate()?;

        let store = ArtifactStore::new(config.storage.clone()).await?;
        let fetcher = Fetcher::new(backend, config.fetcher.clone());
        let (event_tx, _rx) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let queue_state = QueueState {
            queue: Arc::new(tokio::sync::Mutex::new(VecDeque::new())),
            concurrent_limit: Arc::new(tokio::sync::Semaphore::new(
                config.scheduler.max_concurrent_jobs,
            )),
            active_jobs: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
            job_added: Arc::new(tokio::sync::Notify::new()),
            shutdown_token: CancellationToken::new(),
            next_job_id: Arc::new(AtomicU64::new(1)),
            shutdown_complete: Arc::new(tokio::sync::OnceCell::new()),
        };

        tracing::info!(
            backend = fetcher.backend_name(),
            storage = %config.storage.backend,
            max_concurrent_jobs = config.scheduler.max_concurrent_jobs,
            max_pending_jobs = config.scheduler.max_pending_jobs,
            "Media gateway initialized"
        );

        let gateway = Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            event_tx,
            config: Arc::new(config),
            fetcher,
            store,
            queue_state,
        };

        gateway.start_queue_processor();
        gateway.start_reaper();

        Ok(gateway)
    }

    /// Subscribe to job events
    ///
    /// Each subscriber receives all events independently. A subscriber that falls
    /// more than 1000 events behind receives `RecvError::Lagged`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use media_dl::{Config, MediaGateway};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let gateway = MediaGateway::new(Config::default()).await?;
    ///
    ///     let mut events = gateway.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             tracing::info!(?event, "job event");
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Artifact store backing this gateway
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// What this gateway can do
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            backend: self.fetcher.backend_name().to_string(),
            metadata: true,
            storage: self.config.storage.backend.to_string(),
            kinds: vec![MediaKind::Video, MediaKind::Audio],
        }
    }

    /// Whether new submissions are accepted
    pub fn is_accepting(&self) -> bool {
        self.queue_state
            .accepting_new
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Emit an event to all subscribers (dropped if nobody listens)
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    pub(crate) fn lock_jobs(&self) -> MutexGuard<'_, HashMap<JobId, JobRecord>> {
        // Records are plain data; a panic mid-update leaves them usable
        self.jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply `f` to a job's record if it still exists
    pub(crate) fn update_job<F>(&self, id: JobId, f: F)
    where
        F: FnOnce(&mut JobRecord),
    {
        if let Some(record) = self.lock_jobs().get_mut(&id) {
            f(record);
        }
    }

    /// Spawn the REST API server in a background task
    pub fn spawn_api_server(&self) -> tokio::task::JoinHandle<Result<()>> {
        let gateway = Arc::new(self.clone());
        let config = self.config.clone();

        tokio::spawn(async move { crate::api::start_api_server(gateway, config).await })
    }
}
