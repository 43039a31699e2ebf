//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`jobs`] - Submission, inspection, cancellation and result download
//! - [`queue`] - Queue statistics
//! - [`system`] - Health, capabilities, events, OpenAPI, shutdown

use serde::{Deserialize, Serialize};

mod jobs;
mod queue;
mod system;

pub use jobs::*;
pub use queue::*;
pub use system::*;

/// Query parameters for GET /metadata
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema, utoipa::IntoParams)]
pub struct MetadataQuery {
    /// Source URL to inspect
    pub url: String,
}
