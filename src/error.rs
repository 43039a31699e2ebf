//! Error types for media-dl
//!
//! This module provides:
//! - The job error taxonomy ([`ErrorKind`]) every failure is classified into
//! - Component errors (fetch, storage, job control)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use crate::types::{ArtifactId, JobId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of every way a job can end badly
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The URL is malformed or not something the backend can fetch
    InvalidUrl,
    /// The requested format or quality is not available
    UnsupportedFormat,
    /// Transient network failure (retryable)
    NetworkFailure,
    /// The source requires authentication
    AuthRequired,
    /// The source no longer exists
    SourceRemoved,
    /// Conversion to the output container failed
    TranscodeFailure,
    /// The job's deadline passed
    Timeout,
    /// The pending queue is full
    QueueFull,
    /// Artifact storage is exhausted
    StorageExhausted,
    /// The job was cancelled
    Cancelled,
}

impl ErrorKind {
    /// Machine-readable code (matches the serialized form)
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidUrl => "invalid_url",
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::NetworkFailure => "network_failure",
            ErrorKind::AuthRequired => "auth_required",
            ErrorKind::SourceRemoved => "source_removed",
            ErrorKind::TranscodeFailure => "transcode_failure",
            ErrorKind::Timeout => "timeout",
            ErrorKind::QueueFull => "queue_full",
            ErrorKind::StorageExhausted => "storage_exhausted",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    /// HTTP status used when this kind is reported to a caller
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::InvalidUrl => 400,
            ErrorKind::AuthRequired => 403,
            ErrorKind::Cancelled => 409,
            ErrorKind::SourceRemoved => 410,
            ErrorKind::UnsupportedFormat => 422,
            ErrorKind::NetworkFailure | ErrorKind::TranscodeFailure => 502,
            ErrorKind::QueueFull => 503,
            ErrorKind::Timeout => 504,
            ErrorKind::StorageExhausted => 507,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure recorded on a job
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct JobFailure {
    /// Error kind
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
}

impl JobFailure {
    /// Create a new failure record
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Main error type for media-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "scheduler.max_concurrent_jobs")
        key: Option<String>,
    },

    /// Request field failed validation
    #[error("invalid {field}: {message}")]
    InvalidRequest {
        /// The request field at fault
        field: String,
        /// What is wrong with it
        message: String,
    },

    /// Fetcher adapter error
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Artifact store error
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Job control error
    #[error("job error: {0}")]
    Job(#[from] JobError),

    /// Pending queue is at its bound
    #[error("queue full: {capacity} jobs already pending")]
    QueueFull {
        /// Configured pending-queue bound
        capacity: usize,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// External tool execution failed (yt-dlp, ffmpeg)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Normalized errors from the external extraction/transcoding capability
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    /// URL malformed or not handled by the backend
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Requested format/quality unavailable
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Transient network failure
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// Source requires authentication
    #[error("authentication required: {0}")]
    AuthRequired(String),

    /// Source removed, private or otherwise gone
    #[error("source removed: {0}")]
    SourceRemoved(String),

    /// Post-processing/transcoding failed
    #[error("transcode failure: {0}")]
    TranscodeFailure(String),
}

impl FetchError {
    /// Taxonomy kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::InvalidUrl(_) => ErrorKind::InvalidUrl,
            FetchError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            FetchError::NetworkFailure(_) => ErrorKind::NetworkFailure,
            FetchError::AuthRequired(_) => ErrorKind::AuthRequired,
            FetchError::SourceRemoved(_) => ErrorKind::SourceRemoved,
            FetchError::TranscodeFailure(_) => ErrorKind::TranscodeFailure,
        }
    }

    /// Message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            FetchError::InvalidUrl(m)
            | FetchError::UnsupportedFormat(m)
            | FetchError::NetworkFailure(m)
            | FetchError::AuthRequired(m)
            | FetchError::SourceRemoved(m)
            | FetchError::TranscodeFailure(m) => m,
        }
    }
}

impl From<&FetchError> for JobFailure {
    fn from(e: &FetchError) -> Self {
        JobFailure::new(e.kind(), e.message())
    }
}

/// Artifact store errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Capacity ceiling reached
    #[error("storage exhausted: {used} of {capacity} bytes in use (requested {requested})")]
    Exhausted {
        /// Bytes requested by the failing operation
        requested: u64,
        /// Bytes currently accounted
        used: u64,
        /// Configured ceiling
        capacity: u64,
    },

    /// Free disk space below the configured reserve
    #[error("insufficient disk space: {available} bytes free, {reserve} bytes reserved")]
    DiskSpaceLow {
        /// Bytes free on the artifact filesystem
        available: u64,
        /// Configured reserve
        reserve: u64,
    },

    /// Artifact unknown or already reclaimed
    #[error("artifact {0} not found")]
    NotFound(ArtifactId),

    /// Backing storage I/O failed
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<&StorageError> for JobFailure {
    fn from(e: &StorageError) -> Self {
        // Every storage-side failure of a running job is reported as exhaustion:
        // the job could not obtain or fill its buffer.
        JobFailure::new(ErrorKind::StorageExhausted, e.to_string())
    }
}

/// Job control errors
#[derive(Debug, Error)]
pub enum JobError {
    /// Job not found (never existed, or its record was dropped)
    #[error("job {id} not found")]
    NotFound {
        /// The job ID that was not found
        id: JobId,
    },

    /// Cannot perform operation in current state
    #[error("cannot {operation} job {id} in state {current_state}")]
    InvalidState {
        /// The job ID
        id: JobId,
        /// The operation that was attempted (e.g., "cancel")
        operation: String,
        /// The state that prevents the operation
        current_state: String,
    },

    /// Result requested before the job reached a terminal state
    #[error("job {id} is not finished (state: {state})")]
    NotReady {
        /// The job ID
        id: JobId,
        /// Current state
        state: String,
    },

    /// Result requested for a failed or cancelled job
    #[error("job {id} did not succeed: {failure}")]
    Unsuccessful {
        /// The job ID
        id: JobId,
        /// Recorded failure
        failure: JobFailure,
    },
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "queue_full",
///     "message": "queue full: 64 jobs already pending",
///     "details": {
///       "capacity": 64
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "network_failure")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,
            Error::InvalidRequest { .. } => 400,

            Error::Fetch(e) => e.kind().status_code(),

            Error::Storage(StorageError::Exhausted { .. })
            | Error::Storage(StorageError::DiskSpaceLow { .. }) => 507,
            Error::Storage(StorageError::NotFound(_)) => 410,
            Error::Storage(StorageError::Io(_)) => 500,

            Error::Job(JobError::NotFound { .. }) => 404,
            Error::Job(JobError::InvalidState { .. }) => 409,
            Error::Job(JobError::NotReady { .. }) => 409,
            Error::Job(JobError::Unsuccessful { failure, .. }) => failure.kind.status_code(),

            Error::QueueFull { .. } => 503,
            Error::ShuttingDown => 503,
            Error::ExternalTool(_) => 503,

            Error::Io(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidRequest { .. } => "validation_error",
            Error::Fetch(e) => e.kind().as_str(),
            Error::Storage(e) => match e {
                StorageError::Exhausted { .. } | StorageError::DiskSpaceLow { .. } => {
                    ErrorKind::StorageExhausted.as_str()
                }
                StorageError::NotFound(_) => "artifact_gone",
                StorageError::Io(_) => "io_error",
            },
            Error::Job(e) => match e {
                JobError::NotFound { .. } => "job_not_found",
                JobError::InvalidState { .. } => "invalid_state",
                JobError::NotReady { .. } => "not_ready",
                JobError::Unsuccessful { failure, .. } => failure.kind.as_str(),
            },
            Error::QueueFull { .. } => ErrorKind::QueueFull.as_str(),
            Error::Io(_) => "io_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::ShuttingDown => "shutting_down",
            Error::ExternalTool(_) => "external_tool_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({ "key": key })),
            Error::InvalidRequest { field, .. } => Some(serde_json::json!({ "field": field })),
            Error::QueueFull { capacity } => Some(serde_json::json!({ "capacity": capacity })),
            Error::Storage(StorageError::Exhausted {
                requested,
                used,
                capacity,
            }) => Some(serde_json::json!({
                "requested_bytes": requested,
                "used_bytes": used,
                "capacity_bytes": capacity,
            })),
            Error::Storage(StorageError::DiskSpaceLow { available, reserve }) => {
                Some(serde_json::json!({
                    "available_bytes": available,
                    "reserve_bytes": reserve,
                }))
            }
            Error::Job(JobError::NotFound { id }) => Some(serde_json::json!({ "job_id": id })),
            Error::Job(JobError::InvalidState {
                id,
                operation,
                current_state,
            }) => Some(serde_json::json!({
                "job_id": id,
                "operation": operation,
                "current_state": current_state,
            })),
            Error::Job(JobError::NotReady { id, state }) => Some(serde_json::json!({
                "job_id": id,
                "state": state,
            })),
            Error::Job(JobError::Unsuccessful { id, failure }) => Some(serde_json::json!({
                "job_id": id,
                "kind": failure.kind,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
