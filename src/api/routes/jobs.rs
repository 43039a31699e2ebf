//! Job handlers.

use super::MetadataQuery;
use crate::api::AppState;
use crate::api::extract::{ApiJson, ApiPath, ApiQuery};
use crate::error::{Error, Result};
use crate::types::{JobId, JobInfo, JobRequest};
use crate::utils::content_disposition;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

/// POST /jobs - Submit a fetch-and-convert job
#[utoipa::path(
    post,
    path = "/api/v1/jobs",
    tag = "jobs",
    request_body = crate::types::JobRequest,
    responses(
        (status = 201, description = "Job queued", body = crate::types::JobInfo),
        (status = 400, description = "Malformed body, quality hint or timeout", body = crate::error::ApiError),
        (status = 503, description = "Queue full or shutting down", body = crate::error::ApiError),
        (status = 507, description = "Artifact storage exhausted", body = crate::error::ApiError)
    )
)]
pub async fn submit_job(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<JobRequest>,
) -> Result<(StatusCode, Json<JobInfo>)> {
    let info = state.gateway.submit(request).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

/// GET /jobs - List retained jobs
#[utoipa::path(
    get,
    path = "/api/v1/jobs",
    tag = "jobs",
    responses(
        (status = 200, description = "All jobs not yet delivered or reclaimed, oldest first", body = Vec<crate::types::JobInfo>)
    )
)]
pub async fn list_jobs(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.gateway.list_jobs())
}

/// GET /jobs/:id - Get a single job
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}",
    tag = "jobs",
    params(
        ("id" = u64, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job information", body = crate::types::JobInfo),
        (status = 404, description = "Job not found", body = crate::error::ApiError)
    )
)]
pub async fn get_job(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<JobId>,
) -> Result<Json<JobInfo>> {
    Ok(Json(state.gateway.get_job(id)?))
}

/// DELETE /jobs/:id - Cancel a job
///
/// Pending jobs are cancelled at once (200). Running jobs are signalled and
/// finish cancelling in the background (202).
#[utoipa::path(
    delete,
    path = "/api/v1/jobs/{id}",
    tag = "jobs",
    params(
        ("id" = u64, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job cancelled", body = crate::types::JobInfo),
        (status = 202, description = "Cancellation signalled to a running job", body = crate::types::JobInfo),
        (status = 404, description = "Job not found", body = crate::error::ApiError),
        (status = 409, description = "Job already finished", body = crate::error::ApiError)
    )
)]
pub async fn cancel_job(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<JobId>,
) -> Result<(StatusCode, Json<JobInfo>)> {
    state.gateway.cancel(id).await?;
    let info = state.gateway.get_job(id)?;

    let status = if info.state.is_terminal() {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(info)))
}

/// GET /jobs/:id/file - Download a finished job's artifact
///
/// The artifact is released once the response body has been sent (or the
/// client disconnects), after which the job is no longer listed.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}/file",
    tag = "jobs",
    params(
        ("id" = u64, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Artifact bytes (video/mp4 or audio/mpeg)", content_type = "application/octet-stream"),
        (status = 404, description = "Job not found, or already delivered", body = crate::error::ApiError),
        (status = 409, description = "Job not finished yet", body = crate::error::ApiError),
        (status = 410, description = "Artifact reclaimed", body = crate::error::ApiError)
    )
)]
pub async fn download_job_file(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<JobId>,
) -> Result<Response> {
    let delivery = state.gateway.open_result(id).await?;

    let disposition = HeaderValue::from_str(&content_disposition(&delivery.filename))
        .map_err(|e| Error::Other(format!("invalid Content-Disposition header: {}", e)))?;

    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static(delivery.media_type)),
        (header::CONTENT_LENGTH, HeaderValue::from(delivery.size_bytes)),
        (header::CONTENT_DISPOSITION, disposition),
    ];

    Ok((StatusCode::OK, headers, Body::from_stream(delivery)).into_response())
}

/// GET /metadata - Title and available qualities for a URL
#[utoipa::path(
    get,
    path = "/api/v1/metadata",
    tag = "jobs",
    params(MetadataQuery),
    responses(
        (status = 200, description = "Media metadata", body = crate::types::MediaMetadata),
        (status = 400, description = "Invalid URL", body = crate::error::ApiError),
        (status = 502, description = "Backend could not reach the source", body = crate::error::ApiError)
    )
)]
pub async fn get_metadata(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<MetadataQuery>,
) -> Result<Json<crate::types::MediaMetadata>> {
    Ok(Json(state.gateway.metadata(&query.url).await?))
}
