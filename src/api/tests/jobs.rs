use super::*;
use crate::error::FetchError;
use crate::gateway::test_helpers::Script;
use crate::types::JobState;
use serde_json::json;

#[tokio::test]
async fn test_submit_job_returns_201_with_info() {
    let (app, _gateway, _backend) = test_app().await;

    let response = app
        .oneshot(post_json(
            "/api/v1/jobs",
            json!({"url": "https://example.com/v1", "kind": "video"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let info = body_json(response).await;
    assert_eq!(info["url"], "https://example.com/v1");
    assert_eq!(info["kind"], "video");
    assert_eq!(info["max_height"], 720);
    assert_eq!(info["state"], "pending");
    assert!(info["id"].as_u64().is_some());
}

#[tokio::test]
async fn test_submit_accepts_format_aliases() {
    let (app, _gateway, _backend) = test_app().await;

    let response = app
        .oneshot(post_json(
            "/api/v1/jobs",
            json!({"url": "https://example.com/a", "kind": "mp3", "quality": "480p"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["kind"], "audio");
}

#[tokio::test]
async fn test_submit_bad_quality_is_400() {
    let (app, _gateway, _backend) = test_app().await;

    let response = app
        .oneshot(post_json(
            "/api/v1/jobs",
            json!({"url": "https://example.com/v1", "kind": "video", "quality": "potato"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "validation_error");
    assert_eq!(body["error"]["details"]["field"], "quality");
}

#[tokio::test]
async fn test_submit_when_queue_full_is_503() {
    let (app, gateway, backend) = test_app_with(|c| {
        c.scheduler.max_concurrent_jobs = 1;
        c.scheduler.max_pending_jobs = 1;
    })
    .await;
    backend.script("https://example.com/hang", Script::hanging());

    let running = gateway
        .submit(crate::JobRequest::new("https://example.com/hang", crate::MediaKind::Video))
        .await
        .unwrap()
        .id;
    crate::gateway::test_helpers::wait_for_state(&gateway, running, |s| s == JobState::Running)
        .await;
    gateway
        .submit(crate::JobRequest::new("https://example.com/2", crate::MediaKind::Video))
        .await
        .unwrap();

    let response = app
        .oneshot(post_json(
            "/api/v1/jobs",
            json!({"url": "https://example.com/3", "kind": "video"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "queue_full");
    assert_eq!(body["error"]["details"]["capacity"], 1);
}

#[tokio::test]
async fn test_get_and_list_jobs() {
    let (app, gateway, _backend) = test_app().await;
    let id = gateway
        .submit(crate::JobRequest::new("https://example.com/v1", crate::MediaKind::Video))
        .await
        .unwrap()
        .id;
    wait_for_terminal(&gateway, id).await;

    let response = app
        .clone()
        .oneshot(get(&format!("/api/v1/jobs/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let info = body_json(response).await;
    assert_eq!(info["state"], "succeeded");
    assert_eq!(info["artifact"]["media_type"], "video/mp4");

    let response = app.oneshot(get("/api/v1/jobs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_get_unknown_job_is_404() {
    let (app, _gateway, _backend) = test_app().await;

    let response = app.oneshot(get("/api/v1/jobs/4242")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "job_not_found");
    assert_eq!(body["error"]["details"]["job_id"], 4242);
}

#[tokio::test]
async fn test_cancel_running_job_is_202() {
    let (app, gateway, backend) = test_app().await;
    backend.script("https://example.com/hang", Script::hanging());
    let id = gateway
        .submit(crate::JobRequest::new("https://example.com/hang", crate::MediaKind::Video))
        .await
        .unwrap()
        .id;
    crate::gateway::test_helpers::wait_for_state(&gateway, id, |s| s == JobState::Running).await;

    let response = app
        .clone()
        .oneshot(delete(&format!("/api/v1/jobs/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    assert_eq!(wait_for_terminal(&gateway, id).await.state, JobState::Cancelled);

    // Cancelling again conflicts
    let response = app
        .oneshot(delete(&format!("/api/v1/jobs/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"]["code"], "invalid_state");
}

#[tokio::test]
async fn test_download_file_streams_with_headers() {
    let (app, gateway, backend) = test_app().await;
    backend.script("https://example.com/v1", Script::titled("Río Trip"));
    let id = gateway
        .submit(crate::JobRequest::new("https://example.com/v1", crate::MediaKind::Video))
        .await
        .unwrap()
        .id;
    wait_for_terminal(&gateway, id).await;

    let response = app
        .clone()
        .oneshot(get(&format!("/api/v1/jobs/{}/file", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers().clone();
    assert_eq!(headers["content-type"], "video/mp4");
    assert_eq!(
        headers["content-length"],
        Script::default().payload.len().to_string().as_str()
    );
    let disposition = headers["content-disposition"].to_str().unwrap();
    assert!(disposition.starts_with("attachment;"));
    assert!(disposition.contains("filename*=UTF-8''R%C3%ADo%20Trip.mp4"));

    assert_eq!(body_bytes(response).await, Script::default().payload);

    // Delivered once; the job is gone afterwards
    let response = app
        .oneshot(get(&format!("/api/v1/jobs/{}/file", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(gateway.get_job(id).is_err());
}

#[tokio::test]
async fn test_download_unfinished_job_is_409() {
    let (app, gateway, backend) = test_app().await;
    backend.script("https://example.com/hang", Script::hanging());
    let id = gateway
        .submit(crate::JobRequest::new("https://example.com/hang", crate::MediaKind::Video))
        .await
        .unwrap()
        .id;

    let response = app
        .oneshot(get(&format!("/api/v1/jobs/{}/file", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"]["code"], "not_ready");
}

#[tokio::test]
async fn test_download_failed_job_reports_kind() {
    let (app, gateway, backend) = test_app().await;
    backend.script(
        "https://example.com/members",
        Script::failing(FetchError::AuthRequired("members-only content".to_string())),
    );
    let id = gateway
        .submit(crate::JobRequest::new("https://example.com/members", crate::MediaKind::Video))
        .await
        .unwrap()
        .id;
    wait_for_terminal(&gateway, id).await;

    let response = app
        .oneshot(get(&format!("/api/v1/jobs/{}/file", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "auth_required");
    assert_eq!(body["error"]["details"]["job_id"], id.0);
}

#[tokio::test]
async fn test_metadata_route() {
    let (app, _gateway, backend) = test_app().await;
    backend.script("https://example.com/m", Script::titled("Keynote"));

    let response = app
        .clone()
        .oneshot(get("/api/v1/metadata?url=https%3A%2F%2Fexample.com%2Fm"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["title"], "Keynote");
    assert_eq!(body["qualities"], json!([360, 480, 720, 1080]));

    let response = app
        .oneshot(get("/api/v1/metadata?url=notaurl"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "invalid_url");
}

#[tokio::test]
async fn test_job_id_must_be_numeric() {
    let (app, _gateway, _backend) = test_app().await;

    for request in [
        get("/api/v1/jobs/abc"),
        get("/api/v1/jobs/abc/file"),
        delete("/api/v1/jobs/abc"),
    ] {
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "validation_error");
        assert_eq!(body["error"]["details"]["field"], "path");
        assert!(body["error"]["message"].as_str().unwrap().contains("abc"));
    }
}

#[tokio::test]
async fn test_submit_without_url_is_structured_400() {
    let (app, gateway, _backend) = test_app().await;

    let response = app
        .oneshot(post_json("/api/v1/jobs", json!({"kind": "video"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()["content-type"], "application/json");

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "validation_error");
    assert_eq!(body["error"]["details"]["field"], "body");
    assert!(body["error"]["message"].as_str().unwrap().contains("url"));
    assert!(gateway.list_jobs().is_empty());
}

#[tokio::test]
async fn test_submit_unknown_kind_is_structured_400() {
    let (app, gateway, _backend) = test_app().await;

    let response = app
        .oneshot(post_json(
            "/api/v1/jobs",
            json!({"url": "https://example.com/v1", "kind": "mkv"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "validation_error");
    assert!(body["error"]["message"].as_str().unwrap().contains("mkv"));
    assert!(gateway.list_jobs().is_empty());
}

#[tokio::test]
async fn test_submit_non_json_body_is_structured_400() {
    let (app, _gateway, _backend) = test_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/jobs")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "validation_error");
}

#[tokio::test]
async fn test_metadata_without_url_is_structured_400() {
    let (app, _gateway, _backend) = test_app().await;

    let response = app.oneshot(get("/api/v1/metadata")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "validation_error");
    assert_eq!(body["error"]["details"]["field"], "query");
}
