//! OpenAPI documentation and schema generation
//!
//! The spec is generated at compile time with utoipa and served at
//! `/api/v1/openapi.json`, with Swagger UI at `/swagger-ui`.

use utoipa::OpenApi;

/// OpenAPI documentation for the media-dl REST API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "media-dl REST API",
        version = "0.1.0",
        description = "Submit media fetch-and-convert jobs, track them, and download the resulting MP4 or MP3",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6790/api/v1", description = "Local development server")
    ),
    paths(
        // Jobs
        crate::api::routes::submit_job,
        crate::api::routes::list_jobs,
        crate::api::routes::get_job,
        crate::api::routes::cancel_job,
        crate::api::routes::download_job_file,
        crate::api::routes::get_metadata,

        // Queue
        crate::api::routes::queue_stats,

        // System
        crate::api::routes::get_capabilities,
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
        crate::api::routes::shutdown,
    ),
    components(schemas(
        crate::types::JobId,
        crate::types::MediaKind,
        crate::types::JobState,
        crate::types::JobRequest,
        crate::types::JobInfo,
        crate::types::ArtifactInfo,
        crate::types::MediaMetadata,
        crate::types::QueueStats,
        crate::types::Capabilities,
        crate::types::Event,

        crate::config::Config,
        crate::config::SchedulerConfig,
        crate::config::RetryConfig,
        crate::config::StorageBackend,
        crate::config::StorageConfig,
        crate::config::FetcherConfig,
        crate::config::ApiConfig,

        crate::api::routes::MetadataQuery,

        crate::error::ErrorKind,
        crate::error::JobFailure,
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "jobs", description = "Jobs - Submit, inspect, cancel, and download results"),
        (name = "queue", description = "Queue - Admission and storage statistics"),
        (name = "system", description = "System endpoints - Health checks, OpenAPI spec, events, shutdown"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the `X-Api-Key` header scheme
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "api_key",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new("X-Api-Key"),
                    ),
                ),
            );
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_job_routes() {
        let spec = ApiDoc::openapi();
        let paths: Vec<&str> = spec.paths.paths.keys().map(String::as_str).collect();

        for expected in [
            "/api/v1/jobs",
            "/api/v1/jobs/{id}",
            "/api/v1/jobs/{id}/file",
            "/api/v1/metadata",
            "/api/v1/queue/stats",
            "/api/v1/events",
        ] {
            assert!(paths.contains(&expected), "missing path {}", expected);
        }
    }

    #[test]
    fn test_openapi_schemas_and_security() {
        let components = ApiDoc::openapi().components.unwrap();

        assert!(components.schemas.contains_key("JobInfo"));
        assert!(components.schemas.contains_key("ApiError"));
        assert!(components.security_schemes.contains_key("api_key"));
    }

    #[test]
    fn test_openapi_info_and_tags() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "media-dl REST API");

        let tags: Vec<String> = spec.tags.unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(tags, vec!["jobs", "queue", "system"]);
    }

    #[test]
    fn test_openapi_serializes_as_3x() {
        let json = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let version = json["openapi"].as_str().unwrap();
        assert!(version.starts_with("3."));
    }
}
