//! Optional API key authentication
//!
//! When `ApiConfig::api_key` is set, every API request must present the key,
//! either as an `X-Api-Key` header or as `Authorization: Bearer <key>`.

use crate::error::ApiError;
use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Middleware rejecting requests that do not carry the configured API key
///
/// `None` as state lets everything through.
///
/// ```no_run
/// use axum::{Router, middleware};
/// use media_dl::api::auth::require_api_key;
///
/// let router: Router = Router::new().layer(middleware::from_fn_with_state(
///     Some("secret-key-123".to_string()),
///     require_api_key,
/// ));
/// ```
pub async fn require_api_key(
    State(expected_api_key): State<Option<String>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected_key) = expected_api_key else {
        return next.run(request).await;
    };

    match presented_key(request.headers()) {
        Some(key) if constant_time_eq(key.as_bytes(), expected_key.as_bytes()) => {
            next.run(request).await
        }
        Some(_) => unauthorized("Invalid API key"),
        None => unauthorized("Missing X-Api-Key header"),
    }
}

/// Key from `X-Api-Key`, falling back to a bearer token
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(key);
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Compare every byte regardless of where the first mismatch is
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn unauthorized(message: &str) -> Response {
    tracing::debug!(reason = message, "Rejected unauthenticated request");
    (StatusCode::UNAUTHORIZED, Json(ApiError::unauthorized(message))).into_response()
}
