//! Configuration types for media-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Admission control settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SchedulerConfig {
    /// Maximum jobs running at once (default: 4)
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Maximum jobs waiting for a slot before submissions get `queue_full` (default: 64)
    #[serde(default = "default_max_pending_jobs")]
    pub max_pending_jobs: usize,

    /// Default deadline applied to jobs that don't carry one (None = no deadline)
    #[serde(default, with = "optional_duration_serde")]
    pub job_timeout: Option<Duration>,

    /// How long shutdown waits for running jobs to wind down (default: 30 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            max_pending_jobs: default_max_pending_jobs(),
            job_timeout: None,
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Retry behavior for transient fetch failures
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds (default: 500)
    #[serde(default = "default_initial_delay", with = "duration_ms_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries, in milliseconds (default: 5000)
    #[serde(default = "default_max_delay", with = "duration_ms_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// Where artifacts are buffered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Files under `artifact_dir` (default)
    #[default]
    Disk,
    /// Bounded in-process buffers
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Disk => f.write_str("disk"),
            StorageBackend::Memory => f.write_str("memory"),
        }
    }
}

/// Artifact store settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct StorageConfig {
    /// Storage backend
    #[serde(default)]
    pub backend: StorageBackend,

    /// Directory for the disk backend (default: "./artifacts")
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Ceiling on bytes held by sealed and in-flight artifacts (default: 2 GiB)
    #[serde(default = "default_capacity_bytes")]
    pub capacity_bytes: u64,

    /// Free disk space to keep in reserve; disk backend only (default: 0)
    #[serde(default)]
    pub min_free_disk_bytes: u64,

    /// How long artifacts and finished job records are kept (default: 900 seconds)
    #[serde(default = "default_retention", with = "duration_serde")]
    pub retention: Duration,

    /// How often the reclamation task runs (default: 30 seconds)
    #[serde(default = "default_reap_interval", with = "duration_serde")]
    pub reap_interval: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            artifact_dir: default_artifact_dir(),
            capacity_bytes: default_capacity_bytes(),
            min_free_disk_bytes: 0,
            retention: default_retention(),
            reap_interval: default_reap_interval(),
        }
    }
}

/// External fetcher (yt-dlp) settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct FetcherConfig {
    /// Path to the yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Path to ffmpeg, passed to yt-dlp as `--ffmpeg-location` (yt-dlp searches PATH if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for yt-dlp if `ytdlp_path` is not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Netscape cookies file handed to yt-dlp for sources that need a session
    #[serde(default)]
    pub cookies_file: Option<PathBuf>,

    /// Quality ceiling used when a request has no hint (default: 720)
    #[serde(default = "default_max_height")]
    pub default_max_height: u32,

    /// MP3 bitrate for audio jobs (default: 192)
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate_kbps: u32,

    /// How long a cancelled fetch may take to wind down before it is abandoned (default: 5 seconds)
    #[serde(default = "default_cancel_grace", with = "duration_serde")]
    pub cancel_grace: Duration,

    /// Socket timeout passed to yt-dlp (default: 30 seconds)
    #[serde(default = "default_socket_timeout", with = "duration_serde")]
    pub socket_timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            ffmpeg_path: None,
            search_path: true,
            cookies_file: None,
            default_max_height: default_max_height(),
            audio_bitrate_kbps: default_audio_bitrate(),
            cancel_grace: default_cancel_grace(),
            socket_timeout: default_socket_timeout(),
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6790)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Optional API key for authentication
    #[serde(default)]
    pub api_key: Option<String>,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_key: None,
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Main configuration for MediaGateway
///
/// Every section has defaults, so `Config::default()` and `{}` in JSON are both
/// usable configurations.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Admission control
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Retry/backoff policy for transient failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Artifact storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// External fetcher
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// REST API
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Load and validate a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read '{}': {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("failed to parse '{}': {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the gateway cannot run with
    pub fn validate(&self) -> Result<()> {
        fn invalid(key: &str, message: &str) -> Error {
            Error::Config {
                message: message.to_string(),
                key: Some(key.to_string()),
            }
        }

        if self.scheduler.max_concurrent_jobs == 0 {
            return Err(invalid(
                "scheduler.max_concurrent_jobs",
                "must be at least 1",
            ));
        }
        if !(self.retry.backoff_multiplier.is_finite() && self.retry.backoff_multiplier >= 1.0) {
            return Err(invalid("retry.backoff_multiplier", "must be a finite number of at least 1.0"));
        }
        if self.retry.max_delay < self.retry.initial_delay {
            return Err(invalid(
                "retry.max_delay",
                "must not be shorter than retry.initial_delay",
            ));
        }
        if self.storage.capacity_bytes == 0 {
            return Err(invalid("storage.capacity_bytes", "must be greater than 0"));
        }
        if self.storage.reap_interval.is_zero() {
            return Err(invalid("storage.reap_interval", "must be greater than 0"));
        }
        if self.fetcher.default_max_height == 0 {
            return Err(invalid("fetcher.default_max_height", "must be greater than 0"));
        }
        Ok(())
    }
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_max_pending_jobs() -> usize {
    64
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("./artifacts")
}

fn default_capacity_bytes() -> u64 {
    2 * 1024 * 1024 * 1024
}

fn default_retention() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_reap_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_true() -> bool {
    true
}

fn default_max_height() -> u32 {
    720
}

fn default_audio_bitrate() -> u32 {
    192
}

fn default_cancel_grace() -> Duration {
    Duration::from_secs(5)
}

fn default_socket_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// Optional Duration serialization helper (whole seconds)
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
