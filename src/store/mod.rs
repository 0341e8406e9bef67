//! Filesystem-backed task records.
//!
//! Each task id owns two independently readable JSON documents under the
//! work directory: a progress record (`<id>.json`) and a result record
//! (`<id>_file.json`). Records become visible to pollers the instant they
//! are written; a missing record is not an error, it means the task has not
//! reached that point yet.
//!
//! Every task id has exactly one writer (its job runner) for its whole
//! lifetime, so no locking is needed. Writes still go through a temp file
//! plus rename so a concurrent reader never observes a partial document.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("record encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Pollable task progress: a percentage in [0.0, 100.0], or the terminal
/// error sentinel with a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Progress {
    Failed { progress: ErrorSentinel, message: String },
    Percent { progress: f64 },
}

impl Progress {
    pub fn percent(value: f64) -> Self {
        Progress::Percent { progress: value }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Progress::Failed {
            progress: ErrorSentinel,
            message: message.into(),
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Progress::percent(0.0)
    }
}

/// Serializes as the literal string `"error"`; tags a terminal failure
/// record on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorSentinel;

impl Serialize for ErrorSentinel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str("error")
    }
}

impl<'de> Deserialize<'de> for ErrorSentinel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        if tag == "error" {
            Ok(ErrorSentinel)
        } else {
            Err(serde::de::Error::custom("expected \"error\""))
        }
    }
}

/// Where a completed task's file landed and how to label it for the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub filename: PathBuf,
    pub title: String,
}

/// Key-value persistence for task records, keyed by task id.
///
/// The work directory is shared across all tasks but every file name is
/// partitioned by task id, so tasks never contend with each other. Task ids
/// are UUIDs minted by the submission path; the API layer rejects anything
/// else before it reaches the store.
#[derive(Clone)]
pub struct TaskStore {
    root: PathBuf,
}

impl TaskStore {
    /// Opens a store rooted at the given work directory, creating it if
    /// needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Per-task output path template handed to the fetch backend.
    pub fn output_template(&self, task_id: &str) -> String {
        self.root
            .join(format!("{task_id}.%(ext)s"))
            .to_string_lossy()
            .into_owned()
    }

    /// Overwrites the task's progress record. Last write wins.
    pub async fn write_progress(&self, task_id: &str, value: f64) -> Result<()> {
        self.write_json(&self.progress_path(task_id), &Progress::percent(value))
            .await?;
        debug!(task_id, value, "Recorded progress");
        Ok(())
    }

    /// Writes the terminal error record; a specially tagged progress value.
    pub async fn write_error(&self, task_id: &str, message: &str) -> Result<()> {
        self.write_json(&self.progress_path(task_id), &Progress::failed(message))
            .await?;
        debug!(task_id, message, "Recorded task error");
        Ok(())
    }

    /// Writes the terminal result record, a separate slot from progress.
    pub async fn write_result(&self, task_id: &str, record: &ResultRecord) -> Result<()> {
        self.write_json(&self.result_path(task_id), record).await?;
        debug!(task_id, file = %record.filename.display(), "Recorded task result");
        Ok(())
    }

    /// Reads the current progress. Absent or unreadable records read as
    /// "not started yet" (0.0), never as an error.
    pub async fn read_progress(&self, task_id: &str) -> Progress {
        match tokio::fs::read(self.progress_path(task_id)).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => Progress::default(),
        }
    }

    /// Reads the result record. `None` means the task has not produced a
    /// result yet.
    pub async fn read_result(&self, task_id: &str) -> Option<ResultRecord> {
        let bytes = tokio::fs::read(self.result_path(task_id)).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn progress_path(&self, task_id: &str) -> PathBuf {
        self.root.join(format!("{task_id}.json"))
    }

    fn result_path(&self, task_id: &str) -> PathBuf {
        self.root.join(format!("{task_id}_file.json"))
    }

    // Write-temp-then-rename: a reader sees either the old document or the
    // new one, never a torn write.
    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(value)?;
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}
