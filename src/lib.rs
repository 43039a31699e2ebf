//! # media-dl
//!
//! A job gateway for fetching media from a URL and converting it to MP4 or MP3,
//! built around an external extraction tool (`yt-dlp`).
//!
//! ## Design
//!
//! - **Bounded** - at most `max_concurrent_jobs` run at once, at most
//!   `max_pending_jobs` wait, and artifact storage has a byte ceiling
//! - **Cancellable** - pending jobs leave the queue at once, running jobs are
//!   signalled and their partial output discarded
//! - **Retryable** - transient network failures are retried with backoff,
//!   everything else fails fast with a classified error
//! - **Deliver once** - a finished artifact is streamed to one caller and then
//!   released; undelivered artifacts are reclaimed after a retention window
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{Config, JobRequest, MediaGateway, MediaKind};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = MediaGateway::new(Config::default()).await?;
//!
//!     let job = gateway
//!         .submit(JobRequest::new("https://example.com/watch?v=1", MediaKind::Audio))
//!         .await?;
//!
//!     let mut events = gateway.subscribe();
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!         if matches!(event, media_dl::Event::Succeeded { id, .. } if id == job.id) {
//!             break;
//!         }
//!     }
//!
//!     let mut delivery = gateway.open_result(job.id).await?;
//!     let mut bytes = Vec::new();
//!     while let Some(chunk) = delivery.next().await {
//!         bytes.extend_from_slice(&chunk?);
//!     }
//!     std::fs::write(&delivery.filename, bytes)?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Adapter over the external extraction/transcoding tool
pub mod fetcher;
/// Job scheduling, execution and delivery (decomposed into focused submodules)
pub mod gateway;
/// Retry logic with exponential backoff
pub mod retry;
/// Bounded artifact storage
pub mod storage;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{
    ApiConfig, Config, FetcherConfig, RetryConfig, SchedulerConfig, StorageBackend, StorageConfig,
};
pub use error::{
    ApiError, Error, ErrorDetail, ErrorKind, FetchError, JobError, JobFailure, Result,
    StorageError, ToHttpStatus,
};
pub use fetcher::{ByteStream, FetchRequest, MediaBackend, YtDlpBackend};
pub use gateway::{Delivery, MediaGateway};
pub use storage::{Artifact, ArtifactStore, StorageStats};
pub use types::{
    ArtifactInfo, Capabilities, Event, JobId, JobInfo, JobRequest, JobState, MediaKind,
    MediaMetadata, Quality, QueueStats,
};

/// Run the gateway until a termination signal or a shutdown request, then shut it down.
///
/// Returns once [`MediaGateway::shutdown`] has completed. Shutdown is triggered by:
/// - **Unix:** SIGTERM or SIGINT, with fallbacks if signal registration fails
/// - **Windows/other:** Ctrl+C via `tokio::signal::ctrl_c()`
/// - `POST /api/v1/shutdown`, or any other caller of `shutdown()`
///
/// # Example
///
/// ```no_run
/// use media_dl::{MediaGateway, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let gateway = MediaGateway::new(Config::default()).await?;
///     gateway.spawn_api_server();
///
///     run_with_shutdown(gateway).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(gateway: MediaGateway) -> Result<()> {
    tokio::select! {
        _ = wait_for_signal() => {}
        _ = gateway.shutdown_requested() => {
            tracing::info!("Shutdown requested");
        }
    }
    gateway.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
