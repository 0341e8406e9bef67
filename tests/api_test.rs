//! End-to-end API tests with a scripted fetch backend.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use vidbox::api::state::AppState;
use vidbox::config::Config;
use vidbox::fetcher::{
    FetchError, FetchOutcome, FetchRequest, MediaFetcher, ProgressEvent, RawFormat,
};
use vidbox::store::TaskStore;

const WATCH_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

/// How the scripted backend behaves when a download is requested.
#[derive(Clone)]
enum FetchPlan {
    /// Download completes immediately with the given title.
    Succeed { title: String },
    /// First attempt fails, second succeeds.
    FailPrimary { title: String },
    /// Every attempt fails.
    FailAlways,
    /// Never completes; tasks stay at their initial progress.
    Stall,
}

struct MockFetcher {
    formats: Vec<RawFormat>,
    resolve_error: Option<String>,
    plan: FetchPlan,
    attempts: AtomicUsize,
}

impl MockFetcher {
    fn new(plan: FetchPlan) -> Self {
        Self {
            formats: Vec::new(),
            resolve_error: None,
            plan,
            attempts: AtomicUsize::new(0),
        }
    }

    async fn complete(
        title: &str,
        request: &FetchRequest<'_>,
        events: &mpsc::UnboundedSender<ProgressEvent>,
    ) -> Result<FetchOutcome, FetchError> {
        let _ = events.send(ProgressEvent::Downloading {
            percent_text: "50.0%".to_string(),
        });

        let path = PathBuf::from(request.output_template.replace("%(ext)s", "mp4"));
        tokio::fs::write(&path, b"media")
            .await
            .map_err(|e| FetchError::Upstream(e.to_string()))?;

        let _ = events.send(ProgressEvent::Finished);

        Ok(FetchOutcome {
            path,
            title: title.to_string(),
            ext: "mp4".to_string(),
        })
    }
}

#[async_trait]
impl MediaFetcher for MockFetcher {
    async fn resolve(&self, _url: &str) -> Result<Vec<RawFormat>, FetchError> {
        match &self.resolve_error {
            Some(message) => Err(FetchError::Upstream(message.clone())),
            None => Ok(self.formats.clone()),
        }
    }

    async fn fetch(
        &self,
        request: FetchRequest<'_>,
        events: mpsc::UnboundedSender<ProgressEvent>,
    ) -> Result<FetchOutcome, FetchError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        match &self.plan {
            FetchPlan::Succeed { title } => Self::complete(title, &request, &events).await,
            FetchPlan::FailPrimary { title } => {
                if attempt == 0 {
                    Err(FetchError::Upstream(
                        "Requested format is not available".to_string(),
                    ))
                } else {
                    Self::complete(title, &request, &events).await
                }
            }
            FetchPlan::FailAlways => Err(FetchError::Upstream("Video unavailable".to_string())),
            FetchPlan::Stall => std::future::pending().await,
        }
    }
}

async fn build_app(fetcher: MockFetcher) -> (Router, TaskStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();

    let mut config = Config::default();
    config.storage.work_dir = temp_dir.path().to_path_buf();

    let store = TaskStore::open(temp_dir.path()).await.unwrap();
    let state = AppState::new(config, store.clone(), Arc::new(fetcher));

    (vidbox::api::router(state), store, temp_dir)
}

async fn request(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

async fn request_json(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = request(app, req).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn submit_request(url: &str, format_id: Option<&str>) -> Request<Body> {
    let mut body = json!({ "url": url });
    if let Some(id) = format_id {
        body["format_id"] = json!(id);
    }
    Request::builder()
        .method("POST")
        .uri("/tasks")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn submit(app: &Router, url: &str, format_id: Option<&str>) -> String {
    let (status, body) = request_json(app, submit_request(url, format_id)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    body["task_id"].as_str().unwrap().to_string()
}

/// Poll the progress endpoint until the task reaches a terminal state.
async fn wait_for_terminal(app: &Router, task_id: &str) -> Value {
    for _ in 0..200 {
        let (status, body) =
            request_json(app, get(&format!("/tasks/{task_id}/progress"))).await;
        assert_eq!(status, StatusCode::OK);
        if body["progress"] == json!(100.0) || body["progress"] == json!("error") {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {task_id} never reached a terminal state");
}

#[tokio::test]
async fn submit_rejects_invalid_url() {
    let (app, _store, _temp) = build_app(MockFetcher::new(FetchPlan::Stall)).await;

    let (status, body) =
        request_json(&app, submit_request("https://example.com/not-a-video", None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_URL");
}

#[tokio::test]
async fn submit_returns_task_id_and_zero_progress() {
    let (app, _store, _temp) = build_app(MockFetcher::new(FetchPlan::Stall)).await;

    let task_id = submit(&app, WATCH_URL, None).await;
    assert!(Uuid::parse_str(&task_id).is_ok());

    let (status, body) = request_json(&app, get(&format!("/tasks/{task_id}/progress"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "progress": 0.0 }));
}

#[tokio::test]
async fn submissions_get_distinct_task_ids() {
    let (app, _store, _temp) = build_app(MockFetcher::new(FetchPlan::Stall)).await;

    let first = submit(&app, WATCH_URL, None).await;
    let second = submit(&app, WATCH_URL, None).await;
    assert_ne!(first, second);
}

#[tokio::test]
async fn progress_for_unknown_task_reads_as_zero() {
    let (app, _store, _temp) = build_app(MockFetcher::new(FetchPlan::Stall)).await;

    let unknown = Uuid::new_v4();
    let (status, body) = request_json(&app, get(&format!("/tasks/{unknown}/progress"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "progress": 0.0 }));

    // Malformed ids read the same way, without touching storage.
    let (status, body) = request_json(&app, get("/tasks/not-a-uuid/progress")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "progress": 0.0 }));
}

#[tokio::test]
async fn formats_are_video_only_and_sorted_by_resolution() {
    let mut fetcher = MockFetcher::new(FetchPlan::Stall);
    fetcher.formats = vec![
        RawFormat {
            format_id: "140".to_string(),
            ext: Some("m4a".to_string()),
            vcodec: Some("none".to_string()),
            ..Default::default()
        },
        RawFormat {
            format_id: "136".to_string(),
            ext: Some("mp4".to_string()),
            vcodec: Some("avc1".to_string()),
            format_note: Some("720p".to_string()),
            height: Some(720),
            filesize: Some(1_000_000),
            ..Default::default()
        },
        RawFormat {
            format_id: "137".to_string(),
            ext: Some("mp4".to_string()),
            vcodec: Some("avc1".to_string()),
            format_note: Some("1080p".to_string()),
            height: Some(1080),
            ..Default::default()
        },
    ];
    let (app, _store, _temp) = build_app(fetcher).await;

    let (status, body) =
        request_json(&app, get(&format!("/formats?url={WATCH_URL}"))).await;

    assert_eq!(status, StatusCode::OK);
    let formats = body["formats"].as_array().unwrap();
    assert_eq!(formats.len(), 2);
    assert_eq!(formats[0]["format_id"], "137");
    assert_eq!(formats[0]["resolution"], "1080p");
    assert_eq!(formats[1]["format_id"], "136");
    assert_eq!(formats[1]["filesize"], 1_000_000);
}

#[tokio::test]
async fn formats_rejects_invalid_url() {
    let (app, _store, _temp) = build_app(MockFetcher::new(FetchPlan::Stall)).await;

    let (status, body) =
        request_json(&app, get("/formats?url=https://example.com/nope")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_URL");
}

#[tokio::test]
async fn formats_surfaces_resolution_failure() {
    let mut fetcher = MockFetcher::new(FetchPlan::Stall);
    fetcher.resolve_error = Some("Video unavailable".to_string());
    let (app, _store, _temp) = build_app(fetcher).await;

    let (status, body) =
        request_json(&app, get(&format!("/formats?url={WATCH_URL}"))).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "RESOLUTION_FAILED");
    assert!(body["message"].as_str().unwrap().contains("Video unavailable"));
}

#[tokio::test]
async fn download_before_completion_is_not_ready() {
    let (app, _store, _temp) = build_app(MockFetcher::new(FetchPlan::Stall)).await;

    let task_id = submit(&app, WATCH_URL, None).await;
    let (status, body) = request_json(&app, get(&format!("/tasks/{task_id}/download"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_READY");

    // Same answer for a task that was never submitted.
    let unknown = Uuid::new_v4();
    let (status, body) = request_json(&app, get(&format!("/tasks/{unknown}/download"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_READY");
}

#[tokio::test]
async fn download_with_missing_file_reports_file_missing() {
    let (app, store, temp) = build_app(MockFetcher::new(FetchPlan::Stall)).await;

    let task_id = Uuid::new_v4().to_string();
    let record = vidbox::store::ResultRecord {
        filename: temp.path().join(format!("{task_id}.mp4")),
        title: "Gone".to_string(),
    };
    store.write_result(&task_id, &record).await.unwrap();

    let (status, body) = request_json(&app, get(&format!("/tasks/{task_id}/download"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "FILE_MISSING");
}

#[tokio::test]
async fn full_lifecycle_delivers_sanitized_attachment() {
    let (app, _store, _temp) = build_app(MockFetcher::new(FetchPlan::Succeed {
        title: "My: Video/Test".to_string(),
    }))
    .await;

    let task_id = submit(&app, WATCH_URL, None).await;
    let terminal = wait_for_terminal(&app, &task_id).await;
    assert_eq!(terminal, json!({ "progress": 100.0 }));

    let response = app
        .clone()
        .oneshot(get(&format!("/tasks/{task_id}/download")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "video/mp4"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"My_ Video_Test.mp4\""
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"media");
}

#[tokio::test]
async fn failed_task_reports_error_with_message() {
    let (app, _store, _temp) = build_app(MockFetcher::new(FetchPlan::FailAlways)).await;

    let task_id = submit(&app, WATCH_URL, None).await;
    let terminal = wait_for_terminal(&app, &task_id).await;

    assert_eq!(terminal["progress"], "error");
    assert!(terminal["message"].as_str().unwrap().contains("Video unavailable"));
}

#[tokio::test]
async fn primary_format_failure_recovers_via_fallback() {
    let (app, _store, _temp) = build_app(MockFetcher::new(FetchPlan::FailPrimary {
        title: "Recovered".to_string(),
    }))
    .await;

    let task_id = submit(&app, WATCH_URL, Some("137")).await;
    let terminal = wait_for_terminal(&app, &task_id).await;
    assert_eq!(terminal, json!({ "progress": 100.0 }));

    let (status, _body) = request(&app, get(&format!("/tasks/{task_id}/download"))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn health_reports_components() {
    let (app, _store, _temp) = build_app(MockFetcher::new(FetchPlan::Stall)).await;

    let (status, body) = request_json(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["components"]["store"], "healthy");
    assert!(body["version"].as_str().is_some());
}
