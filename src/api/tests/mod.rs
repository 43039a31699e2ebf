use super::*;
use crate::gateway::test_helpers::{ScriptedBackend, create_test_gateway_with, wait_for_terminal};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use std::time::Duration;
use tower::ServiceExt;

mod jobs;

/// Router over a scripted gateway, plus the gateway and backend for setup
async fn test_app() -> (Router, Arc<MediaGateway>, Arc<ScriptedBackend>) {
    test_app_with(|_| {}).await
}

async fn test_app_with<F>(tweak: F) -> (Router, Arc<MediaGateway>, Arc<ScriptedBackend>)
where
    F: FnOnce(&mut Config),
{
    let (gateway, backend) = create_test_gateway_with(tweak).await;
    let gateway = Arc::new(gateway);
    let router = create_router(gateway.clone(), gateway.get_config());
    (router, gateway, backend)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_api_server_spawns() {
    let (gateway, _backend) = create_test_gateway_with(|c| {
        c.api.bind_address = "127.0.0.1:0".parse().unwrap();
    })
    .await;

    let api_handle = gateway.spawn_api_server();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!api_handle.is_finished(), "server exited early");
    api_handle.abort();
}

#[tokio::test]
async fn test_cors_headers_present() {
    let (app, _gateway, _backend) = test_app().await;

    let request = Request::builder()
        .uri("/api/v1/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let (app, _gateway, _backend) = test_app_with(|c| c.api.cors_enabled = false).await;

    let request = Request::builder()
        .uri("/api/v1/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_api_key_guards_routes() {
    let (app, _gateway, _backend) =
        test_app_with(|c| c.api.api_key = Some("letmein".to_string())).await;

    let response = app.clone().oneshot(get("/api/v1/jobs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/api/v1/jobs")
        .header("X-Api-Key", "letmein")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (app, _gateway, _backend) = test_app().await;
    let response = app.oneshot(get("/api/v1/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
