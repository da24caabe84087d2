//! Task tracking API endpoints.
//!
//! Provides the ordinary tracking flow that produces tasks and sessions:
//! - List / create / get / delete tasks
//! - Start and stop work sessions
//! - Change a task's status directly

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use uuid::Uuid;

use super::auth::AuthUser;
use super::routes::AppState;
use super::types::{
    json_body, CreateTaskRequest, SessionResponse, SetStatusRequest, TaskDetailResponse,
};
use crate::store::StoreError;
use crate::tracker::{self, Task};

/// Create task routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_tasks))
        .route("/", post(create_task))
        .route("/:id", get(get_task))
        .route("/:id", delete(delete_task))
        .route("/:id/start", post(start_task))
        .route("/:id/stop", post(stop_task))
        .route("/:id/status", post(set_status))
}

fn store_error(err: StoreError) -> (StatusCode, String) {
    let status = match err {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::Conflict(_) => StatusCode::CONFLICT,
        _ => {
            tracing::error!("Task store error: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

fn require_user(user: Option<Extension<AuthUser>>) -> Result<AuthUser, (StatusCode, String)> {
    match user {
        Some(Extension(user)) if !user.id.trim().is_empty() => Ok(user),
        _ => Err((StatusCode::UNAUTHORIZED, "Unauthorized".to_string())),
    }
}

fn task_not_found(id: Uuid) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("Task {} not found", id))
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    user: Option<Extension<AuthUser>>,
) -> Result<Json<Vec<Task>>, (StatusCode, String)> {
    let user = require_user(user)?;
    let tasks = state.store.list_tasks(&user.id).await.map_err(store_error)?;
    Ok(Json(tasks))
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    user: Option<Extension<AuthUser>>,
    body: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<Json<Task>, (StatusCode, String)> {
    let user = require_user(user)?;
    let req = json_body(body)?;
    let title = req.title.trim();
    if title.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Title must not be empty".to_string()));
    }

    let task = state
        .store
        .create_task(&user.id, title)
        .await
        .map_err(store_error)?;
    tracing::info!("Created task {} for {}", task.id, user.id);
    Ok(Json(task))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    user: Option<Extension<AuthUser>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskDetailResponse>, (StatusCode, String)> {
    let user = require_user(user)?;
    let task = state
        .store
        .get_task(&user.id, id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| task_not_found(id))?;

    let sessions = state
        .store
        .list_sessions(&user.id)
        .await
        .map_err(store_error)?
        .into_iter()
        .filter(|s| s.task_id == id)
        .collect();

    Ok(Json(TaskDetailResponse { task, sessions }))
}

async fn start_task(
    State(state): State<Arc<AppState>>,
    user: Option<Extension<AuthUser>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, (StatusCode, String)> {
    let user = require_user(user)?;
    let session = state
        .store
        .start_session(&user.id, id, tracker::now())
        .await
        .map_err(store_error)?;
    let task = state
        .store
        .get_task(&user.id, id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| task_not_found(id))?;

    tracing::info!("Started session {} on task {}", session.id, id);
    Ok(Json(SessionResponse {
        task,
        session: Some(session),
    }))
}

async fn stop_task(
    State(state): State<Arc<AppState>>,
    user: Option<Extension<AuthUser>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, (StatusCode, String)> {
    let user = require_user(user)?;
    let session = state
        .store
        .stop_session(&user.id, id, tracker::now())
        .await
        .map_err(store_error)?;
    let task = state
        .store
        .get_task(&user.id, id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| task_not_found(id))?;

    match &session {
        Some(s) => tracing::info!("Stopped session {} on task {}", s.id, id),
        None => tracing::debug!("Task {} had no open session to stop", id),
    }
    Ok(Json(SessionResponse { task, session }))
}

async fn set_status(
    State(state): State<Arc<AppState>>,
    user: Option<Extension<AuthUser>>,
    Path(id): Path<Uuid>,
    body: Result<Json<SetStatusRequest>, JsonRejection>,
) -> Result<Json<Task>, (StatusCode, String)> {
    let user = require_user(user)?;
    let req = json_body(body)?;
    // Active-like statuses need a session behind them; those go through /start.
    if req.status.is_active_like() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Status {} can only be set by starting a session", req.status),
        ));
    }

    let updated = state
        .store
        .set_task_status(&user.id, id, req.status, tracker::now())
        .await
        .map_err(store_error)?;
    if !updated {
        return Err(task_not_found(id));
    }

    let task = state
        .store
        .get_task(&user.id, id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| task_not_found(id))?;
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    user: Option<Extension<AuthUser>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    let user = require_user(user)?;
    let deleted = state
        .store
        .delete_task(&user.id, id, tracker::now())
        .await
        .map_err(store_error)?;
    if deleted {
        tracing::info!("Deleted task {} for {}", id, user.id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(task_not_found(id))
    }
}
