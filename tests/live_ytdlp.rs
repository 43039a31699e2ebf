//! End-to-end tests against a real yt-dlp install
//!
//! These shell out to the `yt-dlp` found on PATH and hit the network, so they are
//! gated behind the `live-tests` feature and marked #[ignore].
//!
//! # Running the tests
//!
//! ```bash
//! MEDIA_DL_LIVE_URL='https://www.youtube.com/watch?v=...' \
//!     cargo test --features live-tests --test live_ytdlp -- --ignored --nocapture
//! ```
//!
//! # Environment variables
//!
//! - `MEDIA_DL_LIVE_URL` - A short, publicly available video

#![cfg(feature = "live-tests")]

mod common;

use common::{test_config, wait_for_terminal};
use futures::StreamExt;
use media_dl::{JobRequest, JobState, MediaGateway, MediaKind, YtDlpBackend};
use std::sync::Arc;

fn live_url() -> Option<String> {
    std::env::var("MEDIA_DL_LIVE_URL").ok().filter(|u| !u.is_empty())
}

async fn create_live_gateway() -> Option<(MediaGateway, tempfile::TempDir)> {
    let Some(backend) = YtDlpBackend::from_path() else {
        eprintln!("Skipping: yt-dlp not found on PATH");
        return None;
    };

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut config = test_config(&dir);
    config.storage.capacity_bytes = 512 * 1024 * 1024;
    config.scheduler.job_timeout = Some(std::time::Duration::from_secs(300));

    let gateway = MediaGateway::with_backend(config, Arc::new(backend))
        .await
        .expect("Failed to create gateway");
    Some((gateway, dir))
}

#[tokio::test]
#[ignore]
async fn test_live_metadata() {
    let Some(url) = live_url() else {
        eprintln!("Skipping: MEDIA_DL_LIVE_URL not set");
        return;
    };
    let Some((gateway, _dir)) = create_live_gateway().await else {
        return;
    };

    let metadata = gateway.metadata(&url).await.expect("metadata lookup");
    println!("title: {}, qualities: {:?}", metadata.title, metadata.qualities);

    assert!(!metadata.title.is_empty());
    assert!(!metadata.qualities.is_empty());

    gateway.shutdown().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_live_audio_job() {
    let Some(url) = live_url() else {
        eprintln!("Skipping: MEDIA_DL_LIVE_URL not set");
        return;
    };
    let Some((gateway, _dir)) = create_live_gateway().await else {
        return;
    };

    let id = gateway
        .submit(JobRequest::new(url, MediaKind::Audio))
        .await
        .unwrap()
        .id;

    // Real transcodes take a while; poll past the helper's default window
    let mut info = gateway.get_job(id).unwrap();
    for _ in 0..60 {
        if info.state.is_terminal() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        info = gateway.get_job(id).unwrap();
    }
    let info = if info.state.is_terminal() {
        info
    } else {
        wait_for_terminal(&gateway, id).await
    };
    assert_eq!(info.state, JobState::Succeeded, "job failed: {:?}", info.error);

    let mut delivery = gateway.open_result(id).await.unwrap();
    assert_eq!(delivery.media_type, "audio/mpeg");

    let mut received = 0u64;
    while let Some(chunk) = delivery.next().await {
        received += chunk.unwrap().len() as u64;
    }
    println!("delivered {} ({} bytes)", delivery.filename, received);
    assert_eq!(received, delivery.size_bytes);

    gateway.shutdown().await.unwrap();
}
