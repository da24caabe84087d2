//! Single-task reset.

use super::{require_owner, ReconcileError, ResetOutcome, AUTO_END_RESET};
use crate::store::TrackerStore;
use crate::tracker;
use uuid::Uuid;

/// Force one task back to pending, closing any open sessions first.
///
/// Sessions are closed before the task is touched so the store never passes
/// through a state with more violations than it started with. A task that
/// does not belong to `owner` matches no rows and the call succeeds as a
/// no-op.
pub async fn reset_task(
    store: &dyn TrackerStore,
    owner: Option<&str>,
    task_id: Uuid,
) -> Result<ResetOutcome, ReconcileError> {
    let owner = require_owner(owner)?;
    let now = tracker::now();

    let sessions_closed = store
        .close_task_sessions(owner, task_id, now, AUTO_END_RESET)
        .await
        .map_err(|e| {
            tracing::error!("[reconcile] closing sessions of task {} failed: {}", task_id, e);
            ReconcileError::ReconciliationFailure(e.to_string())
        })?;

    let reset = store
        .reset_task(owner, task_id, now)
        .await
        .map_err(|e| {
            tracing::error!("[reconcile] resetting task {} failed: {}", task_id, e);
            ReconcileError::ReconciliationFailure(e.to_string())
        })?;

    let message = if reset {
        tracing::info!(
            "[reconcile] reset task {} for {} ({} sessions closed)",
            task_id,
            owner,
            sessions_closed
        );
        "Task reset successfully".to_string()
    } else {
        tracing::debug!("[reconcile] reset of task {} for {} matched nothing", task_id, owner);
        "Task not found; nothing to reset".to_string()
    };

    Ok(ResetOutcome {
        task_id,
        sessions_closed,
        reset,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::reconcile::detect_issues;
    use crate::store::InMemoryTrackerStore;
    use crate::tracker::{Session, Task, TaskStatus};

    #[tokio::test]
    async fn test_reset_closes_open_session_and_resets_task() {
        let store = InMemoryTrackerStore::new();
        let task = store.create_task("alice", "Running").await.unwrap();
        let session = store
            .start_session("alice", task.id, Utc::now())
            .await
            .unwrap();

        let outcome = reset_task(&store, Some("alice"), task.id).await.unwrap();
        assert!(outcome.reset);
        assert_eq!(outcome.sessions_closed, 1);
        assert_eq!(outcome.message, "Task reset successfully");

        let closed = store.get_session("alice", session.id).await.unwrap().unwrap();
        assert!(closed.ended_at.is_some());
        assert_eq!(closed.end_reason.as_deref(), Some(AUTO_END_RESET));
        let reset = store.get_task("alice", task.id).await.unwrap().unwrap();
        assert_eq!(reset.status, TaskStatus::Pending);
        assert!(reset.current_session_id.is_none());
    }

    #[tokio::test]
    async fn test_reset_collapses_duplicate_open_sessions() {
        let store = InMemoryTrackerStore::new();
        let task = store.create_task("alice", "Doubled").await.unwrap();
        store
            .start_session("alice", task.id, Utc::now())
            .await
            .unwrap();
        store
            .put_session(&Session::open("alice", task.id, Utc::now()))
            .await
            .unwrap();

        let outcome = reset_task(&store, Some("alice"), task.id).await.unwrap();
        assert_eq!(outcome.sessions_closed, 2);
        assert!(store.list_open_sessions("alice").await.unwrap().is_empty());
        assert!(detect_issues(&store, Some("alice"))
            .await
            .unwrap()
            .is_consistent());
    }

    #[tokio::test]
    async fn test_reset_consistent_task_is_harmless() {
        let store = InMemoryTrackerStore::new();
        let task = store.create_task("alice", "Idle").await.unwrap();
        store
            .set_task_status("alice", task.id, TaskStatus::Completed, Utc::now())
            .await
            .unwrap();

        let outcome = reset_task(&store, Some("alice"), task.id).await.unwrap();
        assert!(outcome.reset);
        assert_eq!(outcome.sessions_closed, 0);
        let after = store.get_task("alice", task.id).await.unwrap().unwrap();
        assert_eq!(after.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_reset_of_foreign_task_is_noop() {
        let store = InMemoryTrackerStore::new();
        let bobs = store.create_task("bob", "Bob's").await.unwrap();
        let session = store
            .start_session("bob", bobs.id, Utc::now())
            .await
            .unwrap();
        let before = store.get_task("bob", bobs.id).await.unwrap().unwrap();

        let outcome = reset_task(&store, Some("alice"), bobs.id).await.unwrap();
        assert!(!outcome.reset);
        assert_eq!(outcome.sessions_closed, 0);

        let after = store.get_task("bob", bobs.id).await.unwrap().unwrap();
        assert_eq!(after, before);
        assert!(store
            .get_session("bob", session.id)
            .await
            .unwrap()
            .unwrap()
            .is_open());
    }

    #[tokio::test]
    async fn test_reset_of_unknown_task_is_noop() {
        let store = InMemoryTrackerStore::new();
        let outcome = reset_task(&store, Some("alice"), Uuid::new_v4())
            .await
            .unwrap();
        assert!(!outcome.reset);
        assert_eq!(outcome.message, "Task not found; nothing to reset");
    }

    #[tokio::test]
    async fn test_reset_without_principal_is_unauthorized() {
        let store = InMemoryTrackerStore::new();
        let task = Task::new("alice", "A").with_status(TaskStatus::Active);
        store.put_task(&task).await.unwrap();

        let err = reset_task(&store, None, task.id).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Unauthorized));
        let untouched = store.get_task("alice", task.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, TaskStatus::Active);
    }
}
