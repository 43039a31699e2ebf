//! Map yt-dlp diagnostics onto the fetch error taxonomy.

use crate::error::FetchError;
use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used)] // literal pattern
static HTTP_STATUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"HTTP Error (\d{3})").expect("valid HTTP status pattern"));

const AUTH_MARKERS: &[&str] = &[
    "sign in to confirm",
    "login required",
    "requires authentication",
    "video is private",
    "private video",
    "members-only",
    "members only",
    "age-restricted",
    "confirm your age",
];

const REMOVED_MARKERS: &[&str] = &[
    "video unavailable",
    "has been removed",
    "no longer available",
    "account associated with this video has been terminated",
    "this video does not exist",
];

const INVALID_URL_MARKERS: &[&str] = &["unsupported url", "is not a valid url"];

const FORMAT_MARKERS: &[&str] = &[
    "requested format is not available",
    "no video formats found",
];

const TRANSCODE_MARKERS: &[&str] = &[
    "postprocessing",
    "ffmpeg",
    "ffprobe",
    "conversion failed",
    "error merging",
];

/// Classify a failed yt-dlp run from its stderr
///
/// Only `ERROR:` lines are matched when there are any; progress and
/// `WARNING:` lines mention ffmpeg and HTTP codes on runs that failed for
/// other reasons. Anything unrecognised is treated as a transient network
/// failure so the runner's bounded retry gets a chance at it.
pub fn classify_stderr(stderr: &str) -> FetchError {
    let message = summarize(stderr);
    let diagnostics = error_lines(stderr);
    let lower = diagnostics.to_lowercase();
    let has = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

    if has(AUTH_MARKERS) {
        return FetchError::AuthRequired(message);
    }
    if has(INVALID_URL_MARKERS) {
        return FetchError::InvalidUrl(message);
    }

    if let Some(status) = HTTP_STATUS
        .captures(&diagnostics)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok())
    {
        match status {
            401 | 403 => return FetchError::AuthRequired(message),
            404 | 410 => return FetchError::SourceRemoved(message),
            _ => {}
        }
    }

    if has(REMOVED_MARKERS) {
        return FetchError::SourceRemoved(message);
    }
    if has(FORMAT_MARKERS) {
        return FetchError::UnsupportedFormat(message);
    }
    if has(TRANSCODE_MARKERS) {
        return FetchError::TranscodeFailure(message);
    }

    FetchError::NetworkFailure(message)
}

/// The `ERROR:` lines of `stderr`, or all of it when there are none
fn error_lines(stderr: &str) -> String {
    let errors: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("ERROR:"))
        .collect();
    if errors.is_empty() {
        stderr.to_string()
    } else {
        errors.join("\n")
    }
}

/// The most useful single line of yt-dlp stderr: the last `ERROR:` line, else
/// the last non-empty line
fn summarize(stderr: &str) -> String {
    let lines = stderr.lines().map(str::trim).filter(|l| !l.is_empty());

    lines
        .clone()
        .filter(|l| l.starts_with("ERROR:"))
        .last()
        .or_else(|| lines.last())
        .map(|l| l.trim_start_matches("ERROR:").trim().to_string())
        .unwrap_or_else(|| "yt-dlp failed without diagnostics".to_string())
}
