//! Sealed artifact metadata and storage handles.

use crate::types::{ArtifactId, JobId, MediaKind};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Where a sealed artifact's bytes live
#[derive(Clone, Debug)]
pub enum ArtifactHandle {
    /// A file under the artifact directory
    File(PathBuf),
    /// A shared in-memory buffer
    Memory(Bytes),
}

/// An immutable, sealed artifact
///
/// Cloning is cheap; clones refer to the same stored bytes.
#[derive(Clone, Debug)]
pub struct Artifact {
    /// Artifact ID
    pub id: ArtifactId,
    /// Owning job
    pub job_id: JobId,
    /// Filename delivered to callers
    pub filename: String,
    /// Media kind
    pub kind: MediaKind,
    /// Size in bytes
    pub size_bytes: u64,
    /// When the artifact was sealed
    pub created_at: DateTime<Utc>,
    pub(crate) handle: ArtifactHandle,
}

impl Artifact {
    /// Media type delivered to callers
    pub fn media_type(&self) -> &'static str {
        self.kind.media_type()
    }

    /// Backing storage handle
    pub fn handle(&self) -> &ArtifactHandle {
        &self.handle
    }

    /// Summary for job info responses
    pub fn info(&self) -> crate::types::ArtifactInfo {
        crate::types::ArtifactInfo {
            filename: self.filename.clone(),
            media_type: self.media_type().to_string(),
            size_bytes: self.size_bytes,
        }
    }
}
