//! Shared test helpers for creating MediaGateway instances in tests.

use crate::config::{Config, StorageBackend};
use crate::error::FetchError;
use crate::fetcher::{ByteStream, FetchRequest, MediaBackend};
use crate::gateway::MediaGateway;
use crate::types::{Event, JobId, JobInfo, JobState, MediaMetadata};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How the scripted backend behaves for one URL
#[derive(Clone, Debug)]
pub(crate) struct Script {
    pub(crate) title: String,
    pub(crate) qualities: Vec<u32>,
    pub(crate) payload: Vec<u8>,
    /// Returned by successive fetches, in order, before the payload is served
    pub(crate) failures: Vec<FetchError>,
    /// Time spent "transcoding" before the stream is returned
    pub(crate) delay: Duration,
    /// Never finish transcoding
    pub(crate) hang: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            title: "Test Clip".to_string(),
            qualities: vec![360, 480, 720, 1080],
            payload: b"scripted media bytes".to_vec(),
            failures: Vec::new(),
            delay: Duration::ZERO,
            hang: false,
        }
    }
}

impl Script {
    pub(crate) fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }

    pub(crate) fn failing(error: FetchError) -> Self {
        Self {
            failures: vec![error; 16],
            ..Self::default()
        }
    }

    pub(crate) fn flaky(times: usize) -> Self {
        Self {
            failures: vec![FetchError::NetworkFailure("connection reset by peer".to_string()); times],
            ..Self::default()
        }
    }

    pub(crate) fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub(crate) fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub(crate) fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }
}

/// Decrements the running count when a fetch stops, however it stops
struct RunningGuard(Arc<AtomicUsize>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Backend whose behavior is scripted per URL
///
/// URLs without a script get [`Script::default`].
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    scripts: Mutex<HashMap<String, Script>>,
    fetches: Mutex<HashMap<String, usize>>,
    started: Mutex<Vec<String>>,
    running: Arc<AtomicUsize>,
    max_running: AtomicUsize,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(&self, url: &str, script: Script) {
        self.scripts.lock().unwrap().insert(url.to_string(), script);
    }

    /// Number of fetch attempts made for `url`
    pub(crate) fn fetches(&self, url: &str) -> usize {
        self.fetches.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    /// URLs in the order their first fetch started
    pub(crate) fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    /// Highest number of fetches observed in flight at once
    pub(crate) fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub(crate) fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    fn script_for(&self, url: &str) -> Script {
        self.scripts
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl MediaBackend for ScriptedBackend {
    async fn extract_metadata(&self, url: &str) -> Result<MediaMetadata, FetchError> {
        let script = self.script_for(url);
        Ok(MediaMetadata {
            title: script.title,
            qualities: script.qualities,
        })
    }

    async fn fetch_and_transcode(
        &self,
        request: &FetchRequest,
        _cancel: CancellationToken,
    ) -> Result<ByteStream, FetchError> {
        let script = self.script_for(&request.url);

        let attempt = {
            let mut fetches = self.fetches.lock().unwrap();
            let count = fetches.entry(request.url.clone()).or_insert(0);
            *count += 1;
            *count
        };
        if attempt == 1 {
            self.started.lock().unwrap().push(request.url.clone());
        }

        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now_running, Ordering::SeqCst);
        let _guard = RunningGuard(self.running.clone());

        if script.hang {
            std::future::pending::<()>().await;
        }
        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }

        if let Some(error) = script.failures.get(attempt - 1) {
            return Err(error.clone());
        }

        let chunks: Vec<Result<Bytes, FetchError>> = script
            .payload
            .chunks(8)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Config for gateway tests: memory storage, fast retries, short grace periods
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.scheduler.max_concurrent_jobs = 2;
    config.scheduler.max_pending_jobs = 8;
    config.scheduler.shutdown_timeout = Duration::from_secs(2);
    config.retry.max_retries = 3;
    config.retry.initial_delay = Duration::from_millis(5);
    config.retry.max_delay = Duration::from_millis(20);
    config.storage.backend = StorageBackend::Memory;
    config.storage.capacity_bytes = 1024 * 1024;
    config.fetcher.cancel_grace = Duration::from_millis(200);
    config
}

/// Helper to create a test gateway over a fresh [`ScriptedBackend`]
pub(crate) async fn create_test_gateway() -> (MediaGateway, Arc<ScriptedBackend>) {
    create_test_gateway_with(|_| {}).await
}

/// Like [`create_test_gateway`], with config tweaks applied first
pub(crate) async fn create_test_gateway_with<F>(tweak: F) -> (MediaGateway, Arc<ScriptedBackend>)
where
    F: FnOnce(&mut Config),
{
    let mut config = test_config();
    tweak(&mut config);

    let backend = Arc::new(ScriptedBackend::new());
    let gateway = MediaGateway::with_backend(config, backend.clone())
        .await
        .unwrap();
    (gateway, backend)
}

/// Poll until the job reaches a terminal state (panics after 5 seconds)
pub(crate) async fn wait_for_terminal(gateway: &MediaGateway, id: JobId) -> JobInfo {
    wait_for_state(gateway, id, |state| state.is_terminal()).await
}

/// Poll until the job's state satisfies `pred` (panics after 5 seconds)
pub(crate) async fn wait_for_state<P>(gateway: &MediaGateway, id: JobId, pred: P) -> JobInfo
where
    P: Fn(JobState) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let info = gateway.get_job(id).unwrap();
        if pred(info.state) {
            return info;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} stuck in {}",
            id,
            info.state
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Drain events already sent to `rx`
pub(crate) fn collect_events(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
