use super::test_helpers::{
    Script, collect_events, create_test_gateway, create_test_gateway_with, wait_for_state,
    wait_for_terminal,
};
use super::*;
use crate::error::{Error, ErrorKind, FetchError, JobError, StorageError};
use crate::types::JobRequest;
use futures::StreamExt;
use std::time::Duration;


/// Submit a video job for `url` with no hints
async fn submit_video(gateway: &MediaGateway, url: &str) -> JobId {
    gateway
        .submit(JobRequest::new(url, MediaKind::Video))
        .await
        .unwrap()
        .id
}
