use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::catalog::FormatDescriptor;

/// Request body for submitting a new download task
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub url: String,
    /// Optional explicit format selection; omit for best available.
    #[serde(default)]
    pub format_id: Option<String>,
}

/// Response after a task has been accepted for background processing
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskAcceptedResponse {
    pub task_id: String,
}

/// Query parameters for format listing
#[derive(Debug, Deserialize)]
pub struct FormatsQuery {
    pub url: String,
}

/// Response listing downloadable formats for a video
#[derive(Debug, Serialize, Deserialize)]
pub struct FormatsResponse {
    pub formats: Vec<FormatDescriptor>,
}

/// Standard error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
}
