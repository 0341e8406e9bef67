//! External media resolution/fetch capability.
//!
//! The rest of the system treats the video platform as a black box behind
//! the [`MediaFetcher`] trait: enumerate available encodings, or download
//! one while streaming loosely structured progress notifications. The
//! production backend shells out to yt-dlp; tests substitute scripted
//! implementations.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod ytdlp;

pub use ytdlp::YtDlpFetcher;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to launch {bin}: {source}")]
    Spawn {
        bin: String,
        source: std::io::Error,
    },

    #[error("{0}")]
    Upstream(String),

    #[error("invalid metadata from resolver: {0}")]
    InvalidMetadata(String),
}

/// One raw format record as reported by the resolver, before cataloging.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFormat {
    #[serde(default)]
    pub format_id: String,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub height: Option<u64>,
    #[serde(default)]
    pub format_note: Option<String>,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub filesize_approx: Option<u64>,
}

/// Progress notifications emitted while a fetch runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// In-flight percentage as raw text. May contain ANSI escape codes and
    /// a trailing percent sign; the consumer parses it best-effort.
    Downloading { percent_text: String },
    Finished,
}

/// One fetch invocation.
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    /// Backend format selector, e.g. `137+bestaudio/best`.
    pub format_spec: &'a str,
    /// Target container; the backend remuxes/transcodes as needed.
    pub merge_container: &'a str,
    /// Output path template understood by the backend (`%(ext)s` slot).
    pub output_template: &'a str,
}

/// What a completed fetch produced.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub path: PathBuf,
    pub title: String,
    pub ext: String,
}

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Enumerates the available formats for a video. Metadata only, no
    /// download.
    async fn resolve(&self, url: &str) -> Result<Vec<RawFormat>, FetchError>;

    /// Downloads per the request, emitting progress events along the way.
    /// Raises on failure; callers own retry policy.
    async fn fetch(
        &self,
        request: FetchRequest<'_>,
        events: mpsc::UnboundedSender<ProgressEvent>,
    ) -> Result<FetchOutcome, FetchError>;
}
