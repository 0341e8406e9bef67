use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::ApiError;
use super::models::{
    FormatsQuery, FormatsResponse, HealthResponse, SubmitRequest, TaskAcceptedResponse,
};
use super::state::AppState;
use super::utils::{content_type_for, sanitize_filename};
use crate::catalog;
use crate::normalize;
use crate::store::Progress;
use crate::worker::{self, DownloadJob};

/// Accept a download task and start it in the background.
///
/// The response only confirms acceptance; completion and failure are
/// observed through the progress endpoint.
pub async fn submit_task(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<TaskAcceptedResponse>), ApiError> {
    let url = normalize::canonical_watch_url(&request.url)
        .ok_or_else(|| ApiError::InvalidUrl(request.url.clone()))?;

    let task_id = Uuid::new_v4().to_string();
    let format_id = request.format_id.filter(|id| !id.is_empty());

    info!(task_id, url, format_id = ?format_id, "Accepted download task");

    worker::spawn(
        DownloadJob {
            task_id: task_id.clone(),
            url,
            format_id,
        },
        state.store.clone(),
        state.fetcher.clone(),
        state.metrics.clone(),
    );
    state.metrics.task_submitted();

    Ok((StatusCode::ACCEPTED, Json(TaskAcceptedResponse { task_id })))
}

/// List video formats available for a URL, best resolution first.
pub async fn list_formats(
    State(state): State<AppState>,
    Query(query): Query<FormatsQuery>,
) -> Result<Json<FormatsResponse>, ApiError> {
    let url = normalize::canonical_watch_url(&query.url)
        .ok_or_else(|| ApiError::InvalidUrl(query.url.clone()))?;

    let raw = state
        .fetcher
        .resolve(&url)
        .await
        .map_err(|e| ApiError::ResolutionFailed(e.to_string()))?;

    let formats = catalog::build_catalog(raw);
    state.metrics.formats_listed();

    Ok(Json(FormatsResponse { formats }))
}

/// Report task progress. Unknown or not-yet-started tasks read as 0.0
/// rather than an error; failed tasks carry the error sentinel and message.
pub async fn get_progress(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Json<Progress> {
    // Only well-formed task ids touch the store; anything else reads as
    // a task that has not started.
    let progress = match Uuid::parse_str(&task_id) {
        Ok(_) => state.store.read_progress(&task_id).await,
        Err(_) => Progress::default(),
    };

    debug!(task_id, ?progress, "Progress poll");
    Json(progress)
}

/// Stream the finished artifact as a file attachment.
pub async fn download_artifact(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Response, ApiError> {
    if Uuid::parse_str(&task_id).is_err() {
        return Err(ApiError::NotReady);
    }

    let record = state
        .store
        .read_result(&task_id)
        .await
        .ok_or(ApiError::NotReady)?;

    let file = tokio::fs::File::open(&record.filename)
        .await
        .map_err(|_| ApiError::FileMissing)?;

    let ext = record
        .filename
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("mp4");
    let attachment_name = format!("{}.{}", sanitize_filename(&record.title), ext);
    let content_type = content_type_for(ext);

    info!(task_id, file = %record.filename.display(), "Serving artifact");

    let stream = ReaderStream::new(file);
    let headers = [
        (header::CONTENT_TYPE, content_type.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{attachment_name}\""),
        ),
    ];

    Ok((headers, Body::from_stream(stream)).into_response())
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut components = HashMap::new();
    components.insert("api".to_string(), "healthy".to_string());
    components.insert(
        "store".to_string(),
        if state.store.root().exists() {
            "healthy".to_string()
        } else {
            "unavailable".to_string()
        },
    );
    components.insert(
        "fetcher".to_string(),
        state.config.fetcher.ytdlp_bin.clone(),
    );

    Json(HealthResponse {
        status: "healthy".to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
