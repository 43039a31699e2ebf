//! Queue handlers.

use crate::api::AppState;
use axum::{Json, extract::State, response::IntoResponse};

/// GET /queue/stats - Job counts by state plus storage usage
#[utoipa::path(
    get,
    path = "/api/v1/queue/stats",
    tag = "queue",
    responses(
        (status = 200, description = "Queue statistics", body = crate::types::QueueStats)
    )
)]
pub async fn queue_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.gateway.queue_stats().await)
}
