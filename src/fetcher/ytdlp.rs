//! `yt-dlp` backend using the external binary

use super::{ByteStream, FetchRequest, MediaBackend, classify_stderr};
use crate::config::FetcherConfig;
use crate::error::{Error, FetchError};
use crate::types::{MediaKind, MediaMetadata, Quality};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

/// Output filename stem inside the scratch directory
const OUTPUT_STEM: &str = "media";

/// Name the cookies copy gets inside the scratch directory
const COOKIES_NAME: &str = "cookies.txt";

/// Read chunk size when streaming the produced file
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// `yt-dlp` backend
///
/// Each call runs the binary in its own scratch directory. Downloads are
/// written there, then the single produced file is streamed back; the
/// directory is removed when the stream is dropped. Children are killed if the
/// call is abandoned.
///
/// # Examples
///
/// ```no_run
/// use media_dl::fetcher::YtDlpBackend;
/// use std::path::PathBuf;
///
/// // Explicit path
/// let backend = YtDlpBackend::new(PathBuf::from("/usr/local/bin/yt-dlp"));
///
/// // Or auto-discover from PATH
/// let backend = YtDlpBackend::from_path();
/// ```
#[derive(Clone, Debug)]
pub struct YtDlpBackend {
    binary_path: PathBuf,
    ffmpeg_path: Option<PathBuf>,
    cookies_file: Option<PathBuf>,
    audio_bitrate_kbps: u32,
    socket_timeout: Duration,
}

impl YtDlpBackend {
    /// Create a backend with an explicit binary path and default options
    pub fn new(binary_path: PathBuf) -> Self {
        let defaults = FetcherConfig::default();
        Self {
            binary_path,
            ffmpeg_path: None,
            cookies_file: None,
            audio_bitrate_kbps: defaults.audio_bitrate_kbps,
            socket_timeout: defaults.socket_timeout,
        }
    }

    /// Attempt to find `yt-dlp` in PATH
    pub fn from_path() -> Option<Self> {
        which::which("yt-dlp").ok().map(Self::new)
    }

    /// Build from configuration, searching PATH when allowed
    pub fn from_config(config: &FetcherConfig) -> crate::Result<Self> {
        let binary_path = match &config.ytdlp_path {
            Some(path) => path.clone(),
            None if config.search_path => which::which("yt-dlp").map_err(|_| {
                Error::ExternalTool(
                    "yt-dlp not found in PATH; set fetcher.ytdlp_path".to_string(),
                )
            })?,
            None => {
                return Err(Error::ExternalTool(
                    "no yt-dlp path configured and PATH search is disabled".to_string(),
                ));
            }
        };

        let ffmpeg_path = config.ffmpeg_path.clone().or_else(|| {
            if config.search_path {
                which::which("ffmpeg").ok()
            } else {
                None
            }
        });
        if ffmpeg_path.is_none() {
            tracing::warn!("ffmpeg not found; merging and audio extraction will fail");
        }

        Ok(Self {
            binary_path,
            ffmpeg_path,
            cookies_file: config.cookies_file.clone(),
            audio_bitrate_kbps: config.audio_bitrate_kbps,
            socket_timeout: config.socket_timeout,
        })
    }

    /// Use a specific ffmpeg binary
    pub fn with_ffmpeg(mut self, path: PathBuf) -> Self {
        self.ffmpeg_path = Some(path);
        self
    }

    /// Pass a cookies file (copied per call, never modified in place)
    pub fn with_cookies_file(mut self, path: PathBuf) -> Self {
        self.cookies_file = Some(path);
        self
    }

    /// Path of the `yt-dlp` binary
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    fn common_args(&self, cookies: Option<&Path>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--no-playlist".into(),
            "--socket-timeout".into(),
            self.socket_timeout.as_secs().max(1).to_string().into(),
        ];
        if let Some(ffmpeg) = &self.ffmpeg_path {
            args.push("--ffmpeg-location".into());
            args.push(ffmpeg.into());
        }
        if let Some(cookies) = cookies {
            args.push("--cookies".into());
            args.push(cookies.into());
        }
        args
    }

    /// Arguments for a metadata dump
    pub fn metadata_args(&self, url: &str, cookies: Option<&Path>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-J".into()];
        args.extend(self.common_args(cookies));
        args.push("--".into());
        args.push(url.into());
        args
    }

    /// Arguments for a download into `scratch`
    pub fn download_args(&self, request: &FetchRequest, scratch: &Path, cookies: Option<&Path>) -> Vec<OsString> {
        let mut args = self.common_args(cookies);
        args.push("--no-progress".into());
        args.push("-o".into());
        args.push(scratch.join(format!("{}.%(ext)s", OUTPUT_STEM)).into());

        match request.kind {
            MediaKind::Video => {
                let h = request.max_height;
                let format = if h == Quality::BEST.0 {
                    "bestvideo+bestaudio/best".to_string()
                } else {
                    format!("bestvideo[height<={h}]+bestaudio/best[height<={h}]/best")
                };
                args.extend(
                    [
                        "-f".to_string(),
                        format,
                        "--merge-output-format".to_string(),
                        "mp4".to_string(),
                        "--recode-video".to_string(),
                        "mp4".to_string(),
                    ]
                    .map(OsString::from),
                );
            }
            MediaKind::Audio => {
                args.extend(
                    [
                        "-f".to_string(),
                        "bestaudio/best".to_string(),
                        "-x".to_string(),
                        "--audio-format".to_string(),
                        "mp3".to_string(),
                        "--audio-quality".to_string(),
                        format!("{}K", self.audio_bitrate_kbps),
                    ]
                    .map(OsString::from),
                );
            }
        }

        args.push("--".into());
        args.push(request.url.as_str().into());
        args
    }

    /// Fresh scratch directory, with the cookies file copied in if configured
    async fn scratch(&self) -> Result<(tempfile::TempDir, Option<PathBuf>), FetchError> {
        let dir = tempfile::Builder::new()
            .prefix("media-dl-")
            .tempdir()
            .map_err(|e| FetchError::TranscodeFailure(format!("failed to create scratch directory: {}", e)))?;

        let cookies = match &self.cookies_file {
            Some(source) => {
                let copy = dir.path().join(COOKIES_NAME);
                tokio::fs::copy(source, &copy).await.map_err(|e| {
                    FetchError::AuthRequired(format!(
                        "cookies file {} unreadable: {}",
                        source.display(),
                        e
                    ))
                })?;
                Some(copy)
            }
            None => None,
        };

        Ok((dir, cookies))
    }

    /// Run the binary to completion; dropping the future kills the child
    async fn run(&self, args: Vec<OsString>, cancel: &CancellationToken) -> Result<Vec<u8>, FetchError> {
        let child = Command::new(&self.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FetchError::TranscodeFailure(format!("failed to execute yt-dlp: {}", e)))?;

        let output = tokio::select! {
            output = child.wait_with_output() => output
                .map_err(|e| FetchError::NetworkFailure(format!("yt-dlp I/O error: {}", e)))?,
            _ = cancel.cancelled() => {
                return Err(FetchError::NetworkFailure("yt-dlp run abandoned".to_string()));
            }
        };

        if output.status.success() {
            Ok(output.stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(status = %output.status, stderr = %stderr.trim(), "yt-dlp exited with failure");
            Err(classify_stderr(&stderr))
        }
    }
}

#[derive(Deserialize)]
struct InfoJson {
    title: Option<String>,
    height: Option<u32>,
    #[serde(default)]
    formats: Vec<FormatJson>,
}

#[derive(Deserialize)]
struct FormatJson {
    height: Option<u32>,
    vcodec: Option<String>,
}

/// Title and distinct video heights from a `-J` dump
pub(crate) fn parse_metadata(json: &[u8]) -> Result<MediaMetadata, FetchError> {
    let info: InfoJson = serde_json::from_slice(json)
        .map_err(|e| FetchError::NetworkFailure(format!("unparseable yt-dlp metadata: {}", e)))?;

    let mut qualities: Vec<u32> = info
        .formats
        .iter()
        .filter(|f| f.vcodec.as_deref() != Some("none"))
        .filter_map(|f| f.height)
        .filter(|&h| h > 0)
        .collect();
    if qualities.is_empty() {
        qualities.extend(info.height.filter(|&h| h > 0));
    }
    qualities.sort_unstable();
    qualities.dedup();

    Ok(MediaMetadata {
        title: info.title.unwrap_or_default(),
        qualities,
    })
}

/// The largest file in `dir` with the expected extension
async fn find_output(dir: &Path, extension: &str) -> Result<Option<(PathBuf, u64)>, std::io::Error> {
    let mut best: Option<(PathBuf, u64)> = None;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let len = entry.metadata().await?.len();
        if best.as_ref().is_none_or(|(_, l)| len > *l) {
            best = Some((path, len));
        }
    }
    Ok(best)
}

#[async_trait]
impl MediaBackend for YtDlpBackend {
    async fn extract_metadata(&self, url: &str) -> Result<MediaMetadata, FetchError> {
        let (_scratch, cookies) = self.scratch().await?;
        let stdout = self
            .run(
                self.metadata_args(url, cookies.as_deref()),
                &CancellationToken::new(),
            )
            .await?;
        parse_metadata(&stdout)
    }

    async fn fetch_and_transcode(
        &self,
        request: &FetchRequest,
        cancel: CancellationToken,
    ) -> Result<ByteStream, FetchError> {
        let (scratch, cookies) = self.scratch().await?;
        let args = self.download_args(request, scratch.path(), cookies.as_deref());

        tracing::debug!(
            job_id = %request.job_id,
            attempt = request.attempt,
            scratch = %scratch.path().display(),
            "Running yt-dlp"
        );
        self.run(args, &cancel).await?;

        let extension = request.container.extension();
        let (path, size) = find_output(scratch.path(), extension)
            .await
            .map_err(|e| FetchError::TranscodeFailure(format!("failed to inspect output: {}", e)))?
            .ok_or_else(|| {
                FetchError::TranscodeFailure(format!("yt-dlp produced no .{} output", extension))
            })?;

        tracing::debug!(job_id = %request.job_id, size, path = %path.display(), "yt-dlp output ready");

        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| FetchError::TranscodeFailure(format!("failed to open output: {}", e)))?;

        // The scratch directory lives as long as the stream
        let stream = ReaderStream::with_capacity(file, STREAM_CHUNK_SIZE).map(move |chunk| {
            let _scratch = &scratch;
            chunk.map_err(|e| FetchError::TranscodeFailure(format!("failed to read output: {}", e)))
        });

        Ok(stream.boxed())
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}
