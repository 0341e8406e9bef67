//! Download job runner.
//!
//! One detached execution unit per submitted task: it drives the fetch
//! backend, translates progress notifications into store writes, and ends
//! with exactly one terminal write — a result record on success or an error
//! record on failure. Nothing ever propagates back to a request handler;
//! the submission path has long since returned by the time a job finishes.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::fetcher::{FetchError, FetchOutcome, FetchRequest, MediaFetcher, ProgressEvent};
use crate::observability::Metrics;
use crate::store::{ResultRecord, StoreError, TaskStore};

/// Retry spec when the primary format fails for any reason: maximally
/// permissive, best single available stream. Inherited behavior; it also
/// fires on transient errors, not just unavailable formats.
const FALLBACK_FORMAT_SPEC: &str = "best";

/// Fixed output container regardless of the source streams.
const MERGE_CONTAINER: &str = "mp4";

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").unwrap());

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("download failed: {0}")]
    Download(#[from] FetchError),

    #[error("failed to persist record: {0}")]
    Store(#[from] StoreError),
}

/// One task's unit of background work.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub task_id: String,
    /// Canonical video URL, already normalized by the submission path.
    pub url: String,
    pub format_id: Option<String>,
}

impl DownloadJob {
    /// Primary format spec: a chosen video format always gets the best
    /// audio stream merged in, so audio is never silently dropped when a
    /// video-only format is selected.
    fn format_spec(&self) -> String {
        match &self.format_id {
            Some(id) => format!("{id}+bestaudio/best"),
            None => "bestvideo+bestaudio/best".to_string(),
        }
    }
}

/// Spawns the job as a detached task and returns immediately. Every failure
/// ends up as a stored error record, never in a caller.
pub fn spawn(
    job: DownloadJob,
    store: Arc<TaskStore>,
    fetcher: Arc<dyn MediaFetcher>,
    metrics: Arc<Metrics>,
) {
    tokio::spawn(async move {
        let task_id = job.task_id.clone();
        match run(job, &store, fetcher.as_ref()).await {
            Ok(record) => {
                info!(task_id, file = %record.filename.display(), "Download complete");
                metrics.task_completed();
            }
            Err(err) => {
                error!(task_id, error = %err, "Download task failed");
                metrics.task_failed();
                if let Err(store_err) = store.write_error(&task_id, &err.to_string()).await {
                    error!(task_id, error = %store_err, "Failed to record task error");
                }
            }
        }
    });
}

async fn run(
    job: DownloadJob,
    store: &TaskStore,
    fetcher: &dyn MediaFetcher,
) -> Result<ResultRecord, TaskError> {
    info!(task_id = job.task_id, url = %job.url, format_id = ?job.format_id, "Starting download");

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(drain_progress(events_rx, store.clone(), job.task_id.clone()));

    let template = store.output_template(&job.task_id);
    let primary = job.format_spec();
    let request = FetchRequest {
        url: &job.url,
        format_spec: &primary,
        merge_container: MERGE_CONTAINER,
        output_template: &template,
    };

    let attempt = match fetcher.fetch(request.clone(), events_tx.clone()).await {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            // A fallback attempt restarts the download, so perceived
            // progress may move backwards. Documented behavior.
            warn!(task_id = job.task_id, error = %err, "Primary format failed, retrying with fallback");
            let fallback = FetchRequest {
                format_spec: FALLBACK_FORMAT_SPEC,
                ..request
            };
            fetcher.fetch(fallback, events_tx.clone()).await
        }
    };

    // Close the channel and let the progress writer flush before the
    // terminal record is written, so the terminal write is truly last.
    drop(events_tx);
    let _ = writer.await;

    let outcome: FetchOutcome = attempt?;

    // Final location is derived from the task id and the reported
    // extension, not from whatever path the backend happened to report.
    let record = ResultRecord {
        filename: store.root().join(format!("{}.{}", job.task_id, outcome.ext)),
        title: outcome.title,
    };
    store.write_result(&job.task_id, &record).await?;

    Ok(record)
}

async fn drain_progress(
    mut events: mpsc::UnboundedReceiver<ProgressEvent>,
    store: TaskStore,
    task_id: String,
) {
    while let Some(event) = events.recv().await {
        let value = match event {
            ProgressEvent::Downloading { percent_text } => parse_percent(&percent_text),
            ProgressEvent::Finished => 100.0,
        };
        if let Err(err) = store.write_progress(&task_id, value).await {
            warn!(task_id, error = %err, "Failed to record progress");
        }
    }
}

/// Best-effort parse of the loosely structured percent text: ANSI escape
/// codes and a trailing percent sign are stripped; anything unparseable
/// reads as 0.0 rather than failing the task.
fn parse_percent(text: &str) -> f64 {
    let clean = ANSI_ESCAPE.replace_all(text, "");
    let clean = clean.trim().trim_end_matches('%').trim();
    clean.parse::<f64>().unwrap_or(0.0)
}
