//! Application state for the API server

use crate::{Config, MediaGateway};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned per request (Arc clones only).
#[derive(Clone)]
pub struct AppState {
    /// The gateway serving every request
    pub gateway: Arc<MediaGateway>,

    /// Configuration (read-only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(gateway: Arc<MediaGateway>, config: Arc<Config>) -> Self {
        Self { gateway, config }
    }
}
