//! Common test utilities for media-dl end-to-end tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use media_dl::{
    ByteStream, Config, Event, FetchError, FetchRequest, JobId, JobInfo, MediaBackend,
    MediaGateway, MediaMetadata, StorageBackend,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Title reported for every fixture URL
pub const FIXTURE_TITLE: &str = "Fixture: Night Drive";

/// Backend that "transcodes" into a small text body describing the request
///
/// URLs whose path contains `/members/` fail with `AuthRequired`, and URLs
/// containing `/flaky/` fail once with a network error before succeeding.
#[derive(Default)]
pub struct FixtureBackend {
    fetches: AtomicUsize,
}

impl FixtureBackend {
    /// Number of fetch attempts made so far
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

/// Body produced for `request`
pub fn fixture_body(request_kind: &str, max_height: u32) -> Vec<u8> {
    format!("{}:{}:{}", FIXTURE_TITLE, request_kind, max_height).into_bytes()
}

#[async_trait]
impl MediaBackend for FixtureBackend {
    async fn extract_metadata(&self, _url: &str) -> Result<MediaMetadata, FetchError> {
        Ok(MediaMetadata {
            title: FIXTURE_TITLE.to_string(),
            qualities: vec![240, 480, 720, 1080],
        })
    }

    async fn fetch_and_transcode(
        &self,
        request: &FetchRequest,
        _cancel: CancellationToken,
    ) -> Result<ByteStream, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if request.url.contains("/members/") {
            return Err(FetchError::AuthRequired(
                "Sign in to confirm your age".to_string(),
            ));
        }
        if request.url.contains("/flaky/") && request.attempt == 1 {
            return Err(FetchError::NetworkFailure("connection reset".to_string()));
        }

        let kind = match request.kind {
            media_dl::MediaKind::Video => "video",
            media_dl::MediaKind::Audio => "audio",
        };
        let body = fixture_body(kind, request.max_height);
        let chunks: Vec<Result<Bytes, FetchError>> = body
            .chunks(4)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}

/// Disk-backed configuration rooted in `dir`, with fast retries
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.scheduler.max_concurrent_jobs = 2;
    config.scheduler.max_pending_jobs = 8;
    config.scheduler.shutdown_timeout = Duration::from_secs(2);
    config.retry.initial_delay = Duration::from_millis(5);
    config.retry.max_delay = Duration::from_millis(20);
    config.storage.backend = StorageBackend::Disk;
    config.storage.artifact_dir = dir.path().join("artifacts");
    config.storage.capacity_bytes = 1024 * 1024;
    config.fetcher.cancel_grace = Duration::from_millis(200);
    config
}

/// Gateway over a [`FixtureBackend`] with its own temp directory
pub async fn create_gateway() -> (MediaGateway, Arc<FixtureBackend>, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let backend = Arc::new(FixtureBackend::default());
    let gateway = MediaGateway::with_backend(test_config(&dir), backend.clone())
        .await
        .expect("Failed to create gateway");
    (gateway, backend, dir)
}

/// Poll until the job reaches a terminal state
pub async fn wait_for_terminal(gateway: &MediaGateway, id: JobId) -> JobInfo {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let info = gateway.get_job(id).expect("job should exist");
        if info.state.is_terminal() {
            return info;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} stuck in {:?}",
            id,
            info.state
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Drain events already buffered in `rx`
pub fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
