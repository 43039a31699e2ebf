//! Fetcher adapter - the only boundary to the external extraction/transcoding tool.
//!
//! A [`MediaBackend`] extracts metadata and produces a transcoded byte stream.
//! [`Fetcher`] wraps a backend with URL validation, the quality check, streaming
//! into an [`ArtifactWriter`], progress reporting and cancellation, so the job
//! runner only ever sees the normalized [`FetchError`] taxonomy.

mod classify;
mod ytdlp;

pub use classify::classify_stderr;
pub use ytdlp::YtDlpBackend;

use crate::config::FetcherConfig;
use crate::error::{FetchError, JobFailure, StorageError};
use crate::retry::IsRetryable;
use crate::storage::ArtifactWriter;
use crate::types::{Container, JobId, MediaKind, MediaMetadata};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Transcoded output produced by a backend
pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// Bytes between two `Progress` reports
pub const PROGRESS_INTERVAL_BYTES: u64 = 1024 * 1024;

/// One fetch attempt's parameters (built fresh for every attempt)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    /// Owning job
    pub job_id: JobId,
    /// 1-based attempt number
    pub attempt: u32,
    /// Source URL (already validated)
    pub url: String,
    /// Requested media kind
    pub kind: MediaKind,
    /// Quality ceiling (max video height)
    pub max_height: u32,
    /// Output container
    pub container: Container,
}

impl FetchRequest {
    /// Build a request; the container follows from `kind`
    pub fn new(job_id: JobId, attempt: u32, url: impl Into<String>, kind: MediaKind, max_height: u32) -> Self {
        Self {
            job_id,
            attempt,
            url: url.into(),
            kind,
            max_height,
            container: kind.container(),
        }
    }
}

/// Result of a completed fetch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Media title from metadata
    pub title: String,
    /// Bytes written to the artifact
    pub bytes_written: u64,
}

/// Why a fetch attempt did not complete
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    /// The backend failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The artifact store refused or failed a write
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The owning job was cancelled
    #[error("fetch cancelled")]
    Cancelled,
}

impl IsRetryable for AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Fetch(e) => e.is_retryable(),
            AttemptError::Storage(_) | AttemptError::Cancelled => false,
        }
    }
}

impl AttemptError {
    /// Terminal failure recorded on the job (None for cancellation)
    pub fn failure(&self) -> Option<JobFailure> {
        match self {
            AttemptError::Fetch(e) => Some(e.into()),
            AttemptError::Storage(e) => Some(e.into()),
            AttemptError::Cancelled => None,
        }
    }
}

/// External extraction/transcoding capability
///
/// Implementations report failures in the [`FetchError`] taxonomy and must stop
/// producing output promptly once `cancel` fires or the returned stream is
/// dropped.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Title and available qualities for `url`
    async fn extract_metadata(&self, url: &str) -> Result<MediaMetadata, FetchError>;

    /// Fetch and transcode `request`, yielding the finished container's bytes
    async fn fetch_and_transcode(
        &self,
        request: &FetchRequest,
        cancel: CancellationToken,
    ) -> Result<ByteStream, FetchError>;

    /// Backend name for logs and capability reports
    fn name(&self) -> &'static str;
}

/// Validate a URL before anything external sees it
///
/// Must parse, use `http` or `https`, and carry a non-empty host.
pub fn validate_url(raw: &str) -> Result<url::Url, FetchError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FetchError::InvalidUrl("URL is empty".to_string()));
    }

    let url = url::Url::parse(trimmed)
        .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", trimmed, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(FetchError::InvalidUrl(format!(
            "unsupported scheme '{}', expected http or https",
            url.scheme()
        )));
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(FetchError::InvalidUrl(format!("{} has no host", trimmed)));
    }

    Ok(url)
}

/// Backend wrapper used by the job runner and the metadata endpoint
#[derive(Clone)]
pub struct Fetcher {
    backend: Arc<dyn MediaBackend>,
    config: FetcherConfig,
}

impl Fetcher {
    /// Wrap a backend
    pub fn new(backend: Arc<dyn MediaBackend>, config: FetcherConfig) -> Self {
        Self { backend, config }
    }

    /// Backend name
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Fetcher configuration
    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Validated metadata lookup
    pub async fn metadata(&self, url: &str) -> Result<MediaMetadata, FetchError> {
        let url = validate_url(url)?;
        self.backend.extract_metadata(url.as_str()).await
    }

    /// Run one attempt, streaming the backend's output into `writer`
    ///
    /// `on_progress` receives the running byte count roughly every
    /// [`PROGRESS_INTERVAL_BYTES`] and once at the end. The writer is left
    /// unsealed; the caller seals it on success or drops it otherwise.
    pub async fn fetch<P>(
        &self,
        request: &FetchRequest,
        writer: &mut ArtifactWriter,
        cancel: &CancellationToken,
        mut on_progress: P,
    ) -> Result<FetchOutcome, AttemptError>
    where
        P: FnMut(u64) + Send,
    {
        let url = validate_url(&request.url)?;

        let metadata = tokio::select! {
            result = self.backend.extract_metadata(url.as_str()) => result?,
            _ = cancel.cancelled() => return Err(AttemptError::Cancelled),
        };
        check_quality(request, &metadata)?;

        tracing::debug!(
            job_id = %request.job_id,
            attempt = request.attempt,
            title = %metadata.title,
            max_height = request.max_height,
            kind = %request.kind,
            "Starting fetch"
        );

        let mut stream = tokio::select! {
            result = self.backend.fetch_and_transcode(request, cancel.child_token()) => result?,
            _ = cancel.cancelled() => return Err(AttemptError::Cancelled),
        };

        let mut written: u64 = 0;
        let mut next_report = PROGRESS_INTERVAL_BYTES;

        loop {
            let chunk = tokio::select! {
                chunk = stream.next() => chunk,
                _ = cancel.cancelled() => return Err(AttemptError::Cancelled),
            };

            let Some(chunk) = chunk else { break };
            let chunk = chunk?;

            writer.write(&chunk).await?;
            written += chunk.len() as u64;

            if written >= next_report {
                on_progress(written);
                next_report = written + PROGRESS_INTERVAL_BYTES;
            }
        }

        if written == 0 {
            return Err(FetchError::TranscodeFailure("backend produced no output".to_string()).into());
        }
        on_progress(written);

        Ok(FetchOutcome {
            title: metadata.title,
            bytes_written: written,
        })
    }
}

/// Video ceilings below every advertised height cannot be satisfied
fn check_quality(request: &FetchRequest, metadata: &MediaMetadata) -> Result<(), FetchError> {
    if request.kind != MediaKind::Video || metadata.qualities.is_empty() {
        return Ok(());
    }

    if metadata.qualities.iter().all(|&h| h > request.max_height) {
        let lowest = metadata.qualities.iter().min().copied().unwrap_or_default();
        return Err(FetchError::UnsupportedFormat(format!(
            "no quality at or below {}p (lowest available is {}p)",
            request.max_height, lowest
        )));
    }
    Ok(())
}
