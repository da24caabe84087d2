//! Task/session consistency reconciliation.
//!
//! Three operations, each a short request/response unit:
//!
//! - [`detect_issues`]: read-only scan that reports every task claiming to be
//!   active without an open session, and every open session whose task is
//!   not active.
//! - [`fix_issues`]: re-scans live data and corrects each violation with a
//!   conditional update. One failing row never blocks the rest.
//! - [`reset_task`]: closes every open session of one task and forces the
//!   task back to pending.
//!
//! Corrections only ever move the store toward consistency. Violations are
//! always re-derived from live data instead of trusting an earlier report,
//! and every write re-checks the state it expects, so a row that was fixed
//! concurrently is skipped rather than touched.

mod detect;
mod fix;
mod reset;
pub mod types;

pub use detect::detect_issues;
pub use fix::fix_issues;
pub use reset::reset_task;
pub use types::*;

use crate::store::StoreError;
use thiserror::Error;

/// End reason recorded on sessions closed because their task was not active.
pub const AUTO_END_NOT_ACTIVE: &str = "Auto-ended: Task not active";

/// End reason recorded on sessions closed by a single-task reset.
pub const AUTO_END_RESET: &str = "Auto-ended: Task reset";

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Data access failure: {0}")]
    DataAccess(#[from] StoreError),

    #[error("Reconciliation failure: {0}")]
    ReconciliationFailure(String),
}

/// Resolve the calling principal, failing closed when there is none.
fn require_owner(owner: Option<&str>) -> Result<&str, ReconcileError> {
    match owner.map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(ReconcileError::Unauthorized),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::{InMemoryTrackerStore, TrackerStore};
    use crate::tracker::{Session, Task, TaskStatus};
    use chrono::Utc;
    use uuid::Uuid;

    /// End-to-end reconciliation scenarios run against every backend.
    ///
    /// Each scenario uses its own owner so they can share one store.
    pub(crate) async fn exercise_scenarios(store: &dyn TrackerStore) {
        // A: active task with its open session is consistent.
        let task = store.create_task("owner-a", "Focus").await.unwrap();
        let session = store
            .start_session("owner-a", task.id, Utc::now())
            .await
            .unwrap();
        let report = detect_issues(store, Some("owner-a")).await.unwrap();
        assert!(report.is_consistent());
        let report = fix_issues(store, Some("owner-a")).await.unwrap();
        assert_eq!(report.fixed, 0);
        assert!(store
            .get_session("owner-a", session.id)
            .await
            .unwrap()
            .unwrap()
            .is_open());

        // B: active task without a session reference, and one whose
        // reference points nowhere.
        let unreferenced = Task::new("owner-b", "Unreferenced").with_status(TaskStatus::Active);
        let dangling = Task::new("owner-b", "Dangling")
            .with_status(TaskStatus::InProgress)
            .with_current_session(Some(Uuid::new_v4()));
        store.put_task(&unreferenced).await.unwrap();
        store.put_task(&dangling).await.unwrap();
        let report = detect_issues(store, Some("owner-b")).await.unwrap();
        assert_eq!(report.summary.orphaned_tasks, 2);
        assert_eq!(report.summary.orphaned_sessions, 0);
        assert!(report.issues.iter().any(|v| matches!(
            v,
            Violation::OrphanedTask {
                cause: OrphanCause::SessionMissing,
                ..
            }
        )));
        let report = fix_issues(store, Some("owner-b")).await.unwrap();
        assert_eq!(report.fixed, 2);
        for id in [unreferenced.id, dangling.id] {
            let task = store.get_task("owner-b", id).await.unwrap().unwrap();
            assert_eq!(task.status, TaskStatus::Pending);
            assert!(task.current_session_id.is_none());
        }

        // C: open session on a pending task, and on a soft-deleted task.
        let pending = store.create_task("owner-c", "Pending").await.unwrap();
        let on_pending = Session::open("owner-c", pending.id, Utc::now());
        store.put_session(&on_pending).await.unwrap();
        let gone = store.create_task("owner-c", "Gone").await.unwrap();
        let on_gone = store
            .start_session("owner-c", gone.id, Utc::now())
            .await
            .unwrap();
        store.delete_task("owner-c", gone.id, Utc::now()).await.unwrap();
        let report = detect_issues(store, Some("owner-c")).await.unwrap();
        assert_eq!(report.summary.orphaned_sessions, 2);
        assert_eq!(report.summary.orphaned_tasks, 0);
        let report = fix_issues(store, Some("owner-c")).await.unwrap();
        assert_eq!(report.fixed, 2);
        for id in [on_pending.id, on_gone.id] {
            let session = store.get_session("owner-c", id).await.unwrap().unwrap();
            assert!(session.ended_at.is_some());
            assert_eq!(session.end_reason.as_deref(), Some(AUTO_END_NOT_ACTIVE));
        }
        let untouched = store.get_task("owner-c", pending.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, TaskStatus::Pending);

        // Doubled: task references a closed session while another stays open.
        let doubled = Task::new("owner-x", "Doubled").with_status(TaskStatus::Active);
        let mut stale = Session::open("owner-x", doubled.id, Utc::now());
        stale.close(Utc::now(), None);
        let lingering = Session::open("owner-x", doubled.id, Utc::now());
        store.put_session(&stale).await.unwrap();
        store.put_session(&lingering).await.unwrap();
        store
            .put_task(&doubled.clone().with_current_session(Some(stale.id)))
            .await
            .unwrap();
        let report = fix_issues(store, Some("owner-x")).await.unwrap();
        assert_eq!(report.fixed, 2);
        assert!(!store
            .get_session("owner-x", lingering.id)
            .await
            .unwrap()
            .unwrap()
            .is_open());

        // Fixing is idempotent for every owner.
        for owner in ["owner-a", "owner-b", "owner-c", "owner-x"] {
            let again = fix_issues(store, Some(owner)).await.unwrap();
            assert_eq!(again.fixed, 0, "owner {}", owner);
            assert!(detect_issues(store, Some(owner))
                .await
                .unwrap()
                .is_consistent());
        }

        // D: reset closes the open session and forces the task to pending.
        let running = store.create_task("owner-d", "Running").await.unwrap();
        let open = store
            .start_session("owner-d", running.id, Utc::now())
            .await
            .unwrap();
        let outcome = reset_task(store, Some("owner-d"), running.id).await.unwrap();
        assert!(outcome.reset);
        assert_eq!(outcome.sessions_closed, 1);
        let closed = store.get_session("owner-d", open.id).await.unwrap().unwrap();
        assert!(closed.ended_at.is_some());
        assert_eq!(closed.end_reason.as_deref(), Some(AUTO_END_RESET));
        let reset = store.get_task("owner-d", running.id).await.unwrap().unwrap();
        assert_eq!(reset.status, TaskStatus::Pending);
        assert!(reset.current_session_id.is_none());

        // Another owner's reset of the same task matches nothing.
        let restarted = store
            .start_session("owner-d", running.id, Utc::now())
            .await
            .unwrap();
        let before = store.get_task("owner-d", running.id).await.unwrap().unwrap();
        let outcome = reset_task(store, Some("owner-a"), running.id).await.unwrap();
        assert!(!outcome.reset);
        assert_eq!(outcome.sessions_closed, 0);
        assert_eq!(
            store.get_task("owner-d", running.id).await.unwrap().unwrap(),
            before
        );
        assert!(store
            .get_session("owner-d", restarted.id)
            .await
            .unwrap()
            .unwrap()
            .is_open());
    }

    #[test]
    fn test_require_owner() {
        assert_eq!(require_owner(Some("alice")).unwrap(), "alice");
        assert_eq!(require_owner(Some("  alice ")).unwrap(), "alice");
        assert!(matches!(
            require_owner(None),
            Err(ReconcileError::Unauthorized)
        ));
        assert!(matches!(
            require_owner(Some("   ")),
            Err(ReconcileError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_memory_store_scenarios() {
        let store = InMemoryTrackerStore::new();
        exercise_scenarios(&store).await;
    }
}
