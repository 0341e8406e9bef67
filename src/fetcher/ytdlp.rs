//! yt-dlp subprocess backend for the [`MediaFetcher`] capability.
//!
//! Metadata resolution uses `--dump-single-json --skip-download`. Downloads
//! run with `--newline` and a fixed progress template so stdout can be
//! parsed line by line; the title and final file path come back through
//! labeled `--print` lines instead of scraping the default log output.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

use super::{FetchError, FetchOutcome, FetchRequest, MediaFetcher, ProgressEvent, RawFormat};
use crate::config::FetcherConfig;

const PROGRESS_TEMPLATE: &str = "download:%(progress._percent_str)s";
const TITLE_PRINT: &str = "pre_process:title:%(title)s";
const FILEPATH_PRINT: &str = "after_move:filepath:%(filepath)s";

pub struct YtDlpFetcher {
    config: FetcherConfig,
}

impl YtDlpFetcher {
    pub fn new(config: FetcherConfig) -> Self {
        Self { config }
    }

    fn spawn_error(&self, source: std::io::Error) -> FetchError {
        FetchError::Spawn {
            bin: self.config.ytdlp_bin.clone(),
            source,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MetadataDump {
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn resolve(&self, url: &str) -> Result<Vec<RawFormat>, FetchError> {
        debug!(url, "Resolving formats");

        let output = Command::new(&self.config.ytdlp_bin)
            .args(["--dump-single-json", "--skip-download", "--no-playlist", "--no-warnings"])
            .arg(url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Upstream(last_error_line(&stderr)));
        }

        let dump: MetadataDump = serde_json::from_slice(&output.stdout)
            .map_err(|e| FetchError::InvalidMetadata(e.to_string()))?;

        Ok(dump.formats)
    }

    async fn fetch(
        &self,
        request: FetchRequest<'_>,
        events: mpsc::UnboundedSender<ProgressEvent>,
    ) -> Result<FetchOutcome, FetchError> {
        debug!(url = request.url, format_spec = request.format_spec, "Starting yt-dlp");

        let mut child = Command::new(&self.config.ytdlp_bin)
            .args([
                "-f",
                request.format_spec,
                "--merge-output-format",
                request.merge_container,
                "-o",
                request.output_template,
                "--no-playlist",
                "--no-warnings",
                "--newline",
                "--progress-template",
                PROGRESS_TEMPLATE,
                "--no-simulate",
                "--print",
                TITLE_PRINT,
                "--print",
                FILEPATH_PRINT,
            ])
            .arg(request.url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FetchError::Upstream("yt-dlp stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| FetchError::Upstream("yt-dlp stderr unavailable".to_string()))?;

        let progress_tx = events.clone();
        let stdout_task = tokio::spawn(async move {
            let mut printed = PrintedFields::default();
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match classify_line(&line) {
                    Line::Progress(text) => {
                        let _ = progress_tx.send(ProgressEvent::Downloading { percent_text: text });
                    }
                    Line::Title(title) => printed.title = Some(title),
                    Line::Filepath(path) => printed.filepath = Some(PathBuf::from(path)),
                    Line::Other => {}
                }
            }
            printed
        });

        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                buf.push_str(&line);
                buf.push('\n');
            }
            buf
        });

        let status = child
            .wait()
            .await
            .map_err(|e| FetchError::Upstream(format!("yt-dlp did not exit cleanly: {e}")))?;

        let printed = stdout_task
            .await
            .map_err(|e| FetchError::Upstream(format!("stdout reader failed: {e}")))?;
        let stderr_buf = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(FetchError::Upstream(last_error_line(&stderr_buf)));
        }

        let _ = events.send(ProgressEvent::Finished);

        let path = printed
            .filepath
            .ok_or_else(|| FetchError::Upstream("yt-dlp reported no output file".to_string()))?;
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or(request.merge_container)
            .to_string();
        let title = printed.title.unwrap_or_else(|| "video".to_string());

        Ok(FetchOutcome { path, title, ext })
    }
}

#[derive(Debug, Default)]
struct PrintedFields {
    title: Option<String>,
    filepath: Option<PathBuf>,
}

#[derive(Debug, PartialEq)]
enum Line {
    Progress(String),
    Title(String),
    Filepath(String),
    Other,
}

fn classify_line(line: &str) -> Line {
    let trimmed = line.trim();
    if let Some(rest) = trimmed.strip_prefix("download:") {
        return Line::Progress(rest.trim().to_string());
    }
    if let Some(rest) = trimmed.strip_prefix("title:") {
        return Line::Title(rest.trim().to_string());
    }
    if let Some(rest) = trimmed.strip_prefix("filepath:") {
        return Line::Filepath(rest.trim().to_string());
    }
    Line::Other
}

/// The most useful single line out of yt-dlp's stderr: the last `ERROR:`
/// line when present, otherwise the last non-empty line.
fn last_error_line(stderr: &str) -> String {
    if let Some(message) = stderr
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix("ERROR:"))
    {
        return message.trim().to_string();
    }

    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("yt-dlp exited with an error")
        .to_string()
}
