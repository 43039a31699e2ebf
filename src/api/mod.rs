//! REST API server module
//!
//! Provides an OpenAPI 3.1 compliant REST API for submitting media jobs,
//! tracking them and downloading their results.

use crate::{Config, MediaGateway, Result};
use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod error_response;
pub mod extract;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Prefix every route is mounted under
pub const API_PREFIX: &str = "/api/v1";

/// Create the API router with all route definitions
///
/// # Routes
///
/// All routes live under `/api/v1`.
///
/// ## Jobs
/// - `POST /jobs` - Submit a fetch-and-convert job
/// - `GET /jobs` - List retained jobs
/// - `GET /jobs/:id` - Get a single job
/// - `DELETE /jobs/:id` - Cancel a job
/// - `GET /jobs/:id/file` - Download a finished job's artifact
/// - `GET /metadata?url=` - Title and available qualities for a URL
///
/// ## Queue
/// - `GET /queue/stats` - Job counts and storage usage
///
/// ## System
/// - `GET /capabilities` - Backend and storage capabilities
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
/// - `GET /events` - Server-sent events stream
/// - `POST /shutdown` - Graceful shutdown
pub fn create_router(gateway: Arc<MediaGateway>, config: Arc<Config>) -> Router {
    let state = AppState::new(gateway, config.clone());

    let api = Router::new()
        // Jobs
        .route("/jobs", post(routes::submit_job).get(routes::list_jobs))
        .route("/jobs/:id", get(routes::get_job).delete(routes::cancel_job))
        .route("/jobs/:id/file", get(routes::download_job_file))
        .route("/metadata", get(routes::get_metadata))
        // Queue
        .route("/queue/stats", get(routes::queue_stats))
        // System
        .route("/capabilities", get(routes::get_capabilities))
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream))
        .route("/shutdown", post(routes::shutdown))
        .with_state(state);

    // Authentication wraps only the API routes, never the Swagger UI
    let api = if config.api.api_key.is_some() {
        api.layer(middleware::from_fn_with_state(
            config.api.api_key.clone(),
            auth::require_api_key,
        ))
    } else {
        api
    };

    let router = Router::new().nest(API_PREFIX, api);

    // SwaggerUi registers its own document route; it must not collide with /api/v1/openapi.json
    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.layer(TraceLayer::new_for_http());

    if config.api.cors_enabled {
        let cors = build_cors_layer(&config.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` (or an empty list) allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers([axum::http::header::CONTENT_DISPOSITION])
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the server stops.
///
/// # Example
///
/// ```no_run
/// use media_dl::{MediaGateway, Config};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let gateway = Arc::new(MediaGateway::new((*config).clone()).await?);
///
/// // Start API server (blocks until shutdown)
/// media_dl::api::start_api_server(gateway, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(gateway: Arc<MediaGateway>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(gateway, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
