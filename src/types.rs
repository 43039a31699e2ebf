//! Core types for media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ErrorKind, JobFailure};

/// Unique identifier for a job
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// Create a new JobId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<JobId> for u64 {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Unique identifier for a stored artifact
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct ArtifactId(pub u64);

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Requested output kind
///
/// Accepts the `mp4`/`mp3` spellings used by the download form as aliases.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Video with audio, normalized to MP4
    #[default]
    #[serde(alias = "mp4")]
    Video,
    /// Audio only, extracted to MP3
    #[serde(alias = "mp3")]
    Audio,
}

impl MediaKind {
    /// Output container this kind is always normalized to
    pub fn container(&self) -> Container {
        match self {
            MediaKind::Video => Container::Mp4,
            MediaKind::Audio => Container::Mp3,
        }
    }

    /// Media type delivered to callers
    pub fn media_type(&self) -> &'static str {
        self.container().media_type()
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

/// Output container
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    /// MPEG-4 (video)
    Mp4,
    /// MPEG-1 Layer III (audio)
    Mp3,
}

impl Container {
    /// File extension, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Mp3 => "mp3",
        }
    }

    /// IANA media type
    pub fn media_type(&self) -> &'static str {
        match self {
            Container::Mp4 => "video/mp4",
            Container::Mp3 => "audio/mpeg",
        }
    }
}

/// Quality ceiling expressed as a maximum vertical resolution
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct Quality(pub u32);

impl Quality {
    /// No ceiling: the best quality the source offers
    pub const BEST: Self = Self(u32::MAX);

    /// Parse a quality hint such as `"720p"`, `"1080"`, `"4k"` or `"best"`.
    ///
    /// Blank input means "no hint" and yields `Ok(None)`. `"best"` lifts the
    /// ceiling entirely.
    pub fn parse_hint(hint: &str) -> Result<Option<Self>, String> {
        let trimmed = hint.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let lower = trimmed.to_ascii_lowercase();
        if lower == "best" {
            return Ok(Some(Self::BEST));
        }
        if lower == "4k" {
            return Ok(Some(Self(2160)));
        }
        if lower == "8k" {
            return Ok(Some(Self(4320)));
        }

        let digits = lower.strip_suffix('p').unwrap_or(&lower);
        match digits.parse::<u32>() {
            Ok(0) => Err(format!("quality '{}' must be greater than zero", hint)),
            Ok(height) => Ok(Some(Self(height))),
            Err(_) => Err(format!(
                "quality '{}' is not a resolution like '720p' or '1080'",
                hint
            )),
        }
    }

    /// Maximum vertical resolution in lines
    pub fn max_height(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}p", self.0)
    }
}

/// Job lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting for a concurrency slot
    Pending,
    /// Admitted and being fetched
    Running,
    /// Artifact ready for delivery
    Succeeded,
    /// Ended with an error
    Failed,
    /// Cancelled by the caller or by shutdown
    Cancelled,
}

impl JobState {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A fetch-and-convert request as submitted by a caller
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct JobRequest {
    /// Source URL
    pub url: String,

    /// Output kind (`video`/`audio`, or `mp4`/`mp3`)
    #[serde(default, alias = "output_format")]
    pub kind: MediaKind,

    /// Optional quality hint such as `"720p"` (ignored for audio)
    #[serde(default)]
    pub quality: Option<String>,

    /// Optional per-job deadline in seconds from submission
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl JobRequest {
    /// Convenience constructor for a request without quality hint or deadline
    pub fn new(url: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            url: url.into(),
            kind,
            quality: None,
            timeout_secs: None,
        }
    }

    /// Set the quality hint
    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
        self
    }

    /// Set the per-job deadline
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

/// Title and available qualities reported by the external capability
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MediaMetadata {
    /// Source title
    pub title: String,
    /// Distinct available video heights, ascending (empty when unknown or audio-only)
    pub qualities: Vec<u32>,
}

/// Artifact summary exposed in job info
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ArtifactInfo {
    /// Filename delivered to the caller
    pub filename: String,
    /// Media type delivered to the caller
    pub media_type: String,
    /// Size in bytes
    pub size_bytes: u64,
}

/// Snapshot of a job for callers
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobInfo {
    /// Job ID
    pub id: JobId,
    /// Source URL
    pub url: String,
    /// Output kind
    pub kind: MediaKind,
    /// Resolved quality ceiling (max vertical resolution)
    pub max_height: u32,
    /// Current state
    pub state: JobState,
    /// Source title, once known
    pub title: Option<String>,
    /// Number of fetch attempts started so far
    pub attempts: u32,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// When the job was admitted
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,
    /// Absolute deadline, if any
    pub deadline: Option<DateTime<Utc>>,
    /// Failure details for `failed`/`cancelled` jobs
    pub error: Option<JobFailure>,
    /// Artifact summary for `succeeded` jobs
    pub artifact: Option<ArtifactInfo>,
}

/// Queue statistics
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct QueueStats {
    /// Jobs waiting for a slot
    pub pending: usize,
    /// Jobs currently running
    pub running: usize,
    /// Retained succeeded jobs not yet delivered
    pub succeeded: usize,
    /// Retained failed jobs
    pub failed: usize,
    /// Retained cancelled jobs
    pub cancelled: usize,
    /// Concurrency cap
    pub max_concurrent_jobs: usize,
    /// Pending queue bound
    pub max_pending_jobs: usize,
    /// Artifact storage bytes in use (sealed + in flight)
    pub storage_used_bytes: u64,
    /// Artifact storage ceiling
    pub storage_capacity_bytes: u64,
}

/// What the running gateway can do
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Capabilities {
    /// Name of the media backend in use
    pub backend: String,
    /// Whether the backend can report metadata
    pub metadata: bool,
    /// Storage backend (`disk` or `memory`)
    pub storage: String,
    /// Output kinds accepted
    pub kinds: Vec<MediaKind>,
}

/// Event emitted during the job lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job accepted and waiting for a slot
    Queued {
        /// Job ID
        id: JobId,
        /// Source URL
        url: String,
    },

    /// Job admitted and running
    Started {
        /// Job ID
        id: JobId,
    },

    /// A transient failure is being retried
    Retrying {
        /// Job ID
        id: JobId,
        /// Attempt number that just failed (1-based)
        attempt: u32,
        /// Backoff before the next attempt
        delay_ms: u64,
        /// Error message
        error: String,
    },

    /// Bytes written to the artifact so far
    Progress {
        /// Job ID
        id: JobId,
        /// Bytes written in the current attempt
        bytes: u64,
    },

    /// Job finished with a sealed artifact
    Succeeded {
        /// Job ID
        id: JobId,
        /// Delivered filename
        filename: String,
        /// Artifact size in bytes
        size_bytes: u64,
    },

    /// Job failed
    Failed {
        /// Job ID
        id: JobId,
        /// Error kind
        kind: ErrorKind,
        /// Error message
        message: String,
    },

    /// Job cancelled
    Cancelled {
        /// Job ID
        id: JobId,
    },

    /// Artifact fully streamed (or the caller disconnected)
    Delivered {
        /// Job ID
        id: JobId,
    },

    /// Artifact storage reclaimed after the retention window
    ArtifactReclaimed {
        /// Owning job ID
        id: JobId,
    },

    /// Gateway is shutting down
    Shutdown,
}

impl Event {
    /// SSE event name for this event
    pub fn name(&self) -> &'static str {
        match self {
            Event::Queued { .. } => "queued",
            Event::Started { .. } => "started",
            Event::Retrying { .. } => "retrying",
            Event::Progress { .. } => "progress",
            Event::Succeeded { .. } => "succeeded",
            Event::Failed { .. } => "failed",
            Event::Cancelled { .. } => "cancelled",
            Event::Delivered { .. } => "delivered",
            Event::ArtifactReclaimed { .. } => "artifact_reclaimed",
            Event::Shutdown => "shutdown",
        }
    }
}
