//! Reconciliation endpoints.
//!
//! - `POST /api/debug-sessions` - Report task/session mismatches
//! - `POST /api/fix-sessions` - Correct every current mismatch
//! - `POST /api/reset-task` - Force one task back to pending

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Extension, Json,
};

use super::auth::AuthUser;
use super::routes::AppState;
use super::types::{json_body, ResetTaskRequest, ResetTaskResponse};
use crate::reconcile::{self, DetectionReport, FixReport, ReconcileError};

fn error_response(err: ReconcileError) -> (StatusCode, String) {
    match err {
        ReconcileError::Unauthorized => (StatusCode::UNAUTHORIZED, err.to_string()),
        ReconcileError::DataAccess(_) | ReconcileError::ReconciliationFailure(_) => {
            tracing::error!("Reconciliation request failed: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn owner(user: &Option<Extension<AuthUser>>) -> Option<&str> {
    user.as_ref().map(|Extension(u)| u.id.as_str())
}

pub async fn debug_sessions(
    State(state): State<Arc<AppState>>,
    user: Option<Extension<AuthUser>>,
) -> Result<Json<DetectionReport>, (StatusCode, String)> {
    reconcile::detect_issues(state.store.as_ref(), owner(&user))
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn fix_sessions(
    State(state): State<Arc<AppState>>,
    user: Option<Extension<AuthUser>>,
) -> Result<Json<FixReport>, (StatusCode, String)> {
    reconcile::fix_issues(state.store.as_ref(), owner(&user))
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn reset_task(
    State(state): State<Arc<AppState>>,
    user: Option<Extension<AuthUser>>,
    body: Result<Json<ResetTaskRequest>, JsonRejection>,
) -> Result<Json<ResetTaskResponse>, (StatusCode, String)> {
    let req = json_body(body)?;
    let outcome = reconcile::reset_task(state.store.as_ref(), owner(&user), req.task_id)
        .await
        .map_err(error_response)?;
    Ok(Json(ResetTaskResponse {
        message: outcome.message,
        sessions_closed: outcome.sessions_closed,
        reset: outcome.reset,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::tests::test_state;
    use crate::tracker::{Task, TaskStatus};
    use chrono::Utc;

    fn alice() -> Option<Extension<AuthUser>> {
        Some(Extension(AuthUser {
            id: "alice".to_string(),
        }))
    }

    #[tokio::test]
    async fn test_debug_then_fix_then_debug() {
        let state = test_state();
        let orphan = Task::new("alice", "Orphan").with_status(TaskStatus::Active);
        state.store.put_task(&orphan).await.unwrap();

        let Json(report) = debug_sessions(State(state.clone()), alice()).await.unwrap();
        assert_eq!(report.summary.total, 1);

        let Json(fixed) = fix_sessions(State(state.clone()), alice()).await.unwrap();
        assert_eq!(fixed.fixed, 1);
        assert_eq!(fixed.message, "Fixed 1 issues");

        let Json(after) = debug_sessions(State(state.clone()), alice()).await.unwrap();
        assert!(after.is_consistent());

        let Json(again) = fix_sessions(State(state), alice()).await.unwrap();
        assert_eq!(again.fixed, 0);
        assert_eq!(again.message, "No issues found");
    }

    #[tokio::test]
    async fn test_missing_principal_is_401() {
        let state = test_state();
        let (status, _) = debug_sessions(State(state.clone()), None).await.unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = fix_sessions(State(state), None).await.unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_reset_task_endpoint() {
        let state = test_state();
        let task = state.store.create_task("alice", "Running").await.unwrap();
        state
            .store
            .start_session("alice", task.id, Utc::now())
            .await
            .unwrap();

        let req: ResetTaskRequest =
            serde_json::from_value(serde_json::json!({ "taskId": task.id })).unwrap();
        let Json(resp) = reset_task(State(state.clone()), alice(), Ok(Json(req)))
            .await
            .unwrap();
        assert!(resp.reset);
        assert_eq!(resp.sessions_closed, 1);
        assert_eq!(resp.message, "Task reset successfully");

        let after = state.store.get_task("alice", task.id).await.unwrap().unwrap();
        assert_eq!(after.status, TaskStatus::Pending);
    }

    #[test]
    fn test_error_mapping() {
        let (status, _) = error_response(ReconcileError::Unauthorized);
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, msg) =
            error_response(ReconcileError::ReconciliationFailure("disk full".to_string()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(msg.contains("disk full"));
    }
}
