//! API request and response types.

use axum::{extract::rejection::JsonRejection, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tracker::{Session, Task, TaskStatus};

/// Unwrap a JSON request body, reporting malformed or mistyped bodies as 400.
pub(crate) fn json_body<T>(
    body: Result<Json<T>, JsonRejection>,
) -> Result<T, (StatusCode, String)> {
    body.map(|Json(req)| req)
        .map_err(|rejection| (StatusCode::BAD_REQUEST, rejection.body_text()))
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,

    /// Whether the server is running in dev mode (auth disabled)
    pub dev_mode: bool,

    /// Whether auth is required for API requests (dev_mode=false)
    pub auth_required: bool,

    /// Backing store (`memory` or `sqlite`)
    pub store: String,
}

/// Request to reset a single task.
#[derive(Debug, Clone, Deserialize)]
pub struct ResetTaskRequest {
    #[serde(alias = "taskId")]
    pub task_id: Uuid,
}

/// Response from a single-task reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetTaskResponse {
    pub message: String,
    pub sessions_closed: usize,
    /// False when the task did not exist for the caller
    pub reset: bool,
}

/// Request to create a task.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
}

/// Request to change a task's status directly.
#[derive(Debug, Clone, Deserialize)]
pub struct SetStatusRequest {
    pub status: TaskStatus,
}

/// A task together with its sessions, newest last.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDetailResponse {
    #[serde(flatten)]
    pub task: Task,
    pub sessions: Vec<Session>,
}

/// Response from starting or stopping work on a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub task: Task,
    pub session: Option<Session>,
}
