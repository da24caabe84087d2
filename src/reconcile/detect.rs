//! Read-only consistency scan.

use super::{require_owner, DetectionReport, OrphanCause, ReconcileError, Violation};
use crate::store::{StoreResult, TrackerStore};
use crate::tracker::TaskStatus;

/// Scan an owner's tasks and sessions and report every violation.
///
/// Task violations come first in task order, then session violations in
/// session order, so the same snapshot always yields the same report. Any
/// read failure aborts the scan; a partial report is never returned.
pub async fn detect_issues(
    store: &dyn TrackerStore,
    owner: Option<&str>,
) -> Result<DetectionReport, ReconcileError> {
    let owner = require_owner(owner)?;
    let issues = scan(store, owner).await?;
    let report = DetectionReport::new(issues);
    tracing::debug!(
        "[reconcile] detect for {}: {} orphaned tasks, {} orphaned sessions",
        owner,
        report.summary.orphaned_tasks,
        report.summary.orphaned_sessions
    );
    Ok(report)
}

/// Derive the current violation set for an already-resolved owner.
pub(super) async fn scan(store: &dyn TrackerStore, owner: &str) -> StoreResult<Vec<Violation>> {
    let mut issues = Vec::new();

    for task in store
        .list_tasks_with_status(owner, &TaskStatus::ACTIVE_LIKE)
        .await?
    {
        let cause = match task.current_session_id {
            None => Some(OrphanCause::NoSessionReference),
            Some(session_id) => match store.get_session(owner, session_id).await? {
                None => Some(OrphanCause::SessionMissing),
                Some(session) if !session.is_open() => Some(OrphanCause::SessionClosed),
                Some(_) => None,
            },
        };
        if let Some(cause) = cause {
            issues.push(Violation::orphaned_task(
                task.id,
                &task.title,
                task.status,
                task.current_session_id,
                cause,
            ));
        }
    }

    for open in store.list_open_sessions(owner).await? {
        let task = open.task.as_ref();
        if task.is_some_and(|t| t.status.is_active_like()) {
            continue;
        }
        issues.push(Violation::orphaned_session(
            open.session.id,
            open.session.task_id,
            open.session.started_at,
            task.map(|t| (t.title.as_str(), t.status)),
        ));
    }

    Ok(issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::ViolationKind;
    use crate::store::InMemoryTrackerStore;
    use crate::tracker::{Session, Task};
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_consistent_active_task_has_no_violations() {
        let store = InMemoryTrackerStore::new();
        let task = store.create_task("alice", "Focus").await.unwrap();
        store
            .start_session("alice", task.id, Utc::now())
            .await
            .unwrap();

        let report = detect_issues(&store, Some("alice")).await.unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.summary.total, 0);
    }

    #[tokio::test]
    async fn test_active_task_without_session_reference() {
        let store = InMemoryTrackerStore::new();
        let task = Task::new("alice", "Orphan").with_status(TaskStatus::Active);
        store.put_task(&task).await.unwrap();

        let report = detect_issues(&store, Some("alice")).await.unwrap();
        assert_eq!(report.summary.orphaned_tasks, 1);
        assert_eq!(report.summary.total, 1);
        match &report.issues[0] {
            Violation::OrphanedTask {
                task_id,
                cause,
                status,
                current_session_id,
                ..
            } => {
                assert_eq!(*task_id, task.id);
                assert_eq!(*cause, OrphanCause::NoSessionReference);
                assert_eq!(*status, TaskStatus::Active);
                assert!(current_session_id.is_none());
            }
            other => panic!("unexpected violation {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_active_task_with_missing_or_closed_session() {
        let store = InMemoryTrackerStore::new();
        let missing = Task::new("alice", "Missing")
            .with_status(TaskStatus::InProgress)
            .with_current_session(Some(Uuid::new_v4()));
        store.put_task(&missing).await.unwrap();

        let closed_task = Task::new("alice", "Closed").with_status(TaskStatus::Active);
        let mut closed = Session::open("alice", closed_task.id, Utc::now());
        closed.close(Utc::now(), None);
        store.put_session(&closed).await.unwrap();
        store
            .put_task(&closed_task.with_current_session(Some(closed.id)))
            .await
            .unwrap();

        let report = detect_issues(&store, Some("alice")).await.unwrap();
        let causes: Vec<(Uuid, OrphanCause)> = report
            .issues
            .iter()
            .filter_map(|v| match v {
                Violation::OrphanedTask { task_id, cause, .. } => Some((*task_id, *cause)),
                _ => None,
            })
            .collect();
        assert_eq!(causes.len(), 2);
        assert!(causes.contains(&(missing.id, OrphanCause::SessionMissing)));
        assert!(causes
            .iter()
            .any(|(_, cause)| *cause == OrphanCause::SessionClosed));
        assert_eq!(report.summary.orphaned_sessions, 0);
    }

    #[tokio::test]
    async fn test_session_of_another_owner_counts_as_missing() {
        let store = InMemoryTrackerStore::new();
        let foreign_task = Task::new("bob", "Bob's");
        let foreign = Session::open("bob", foreign_task.id, Utc::now());
        store.put_session(&foreign).await.unwrap();

        let task = Task::new("alice", "Borrowed")
            .with_status(TaskStatus::Active)
            .with_current_session(Some(foreign.id));
        store.put_task(&task).await.unwrap();

        let report = detect_issues(&store, Some("alice")).await.unwrap();
        assert_eq!(report.summary.orphaned_tasks, 1);
        assert!(matches!(
            report.issues[0],
            Violation::OrphanedTask {
                cause: OrphanCause::SessionMissing,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_open_session_on_inactive_or_missing_task() {
        let store = InMemoryTrackerStore::new();
        let pending = store.create_task("alice", "Pending").await.unwrap();
        let on_pending = Session::open("alice", pending.id, Utc::now());
        store.put_session(&on_pending).await.unwrap();

        let dangling = Session::open("alice", Uuid::new_v4(), Utc::now());
        store.put_session(&dangling).await.unwrap();

        let report = detect_issues(&store, Some("alice")).await.unwrap();
        assert_eq!(report.summary.orphaned_sessions, 2);
        assert_eq!(report.summary.orphaned_tasks, 0);
        assert!(report
            .issues
            .iter()
            .all(|v| v.kind() == ViolationKind::OrphanedSession));

        let with_task = report
            .issues
            .iter()
            .find(|v| v.session_id() == Some(on_pending.id))
            .expect("session on pending task reported");
        match with_task {
            Violation::OrphanedSession {
                task_title,
                task_status,
                ..
            } => {
                assert_eq!(task_title.as_deref(), Some("Pending"));
                assert_eq!(*task_status, Some(TaskStatus::Pending));
            }
            other => panic!("unexpected violation {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_detect_is_owner_scoped() {
        let store = InMemoryTrackerStore::new();
        let task = Task::new("bob", "Bob's orphan").with_status(TaskStatus::Active);
        store.put_task(&task).await.unwrap();

        let report = detect_issues(&store, Some("alice")).await.unwrap();
        assert!(report.is_consistent());
    }

    #[tokio::test]
    async fn test_detect_without_principal_is_unauthorized() {
        let store = InMemoryTrackerStore::new();
        let err = detect_issues(&store, None).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Unauthorized));
    }

    #[tokio::test]
    async fn test_detect_does_not_mutate() {
        let store = InMemoryTrackerStore::new();
        let orphan = Task::new("alice", "Orphan").with_status(TaskStatus::Active);
        store.put_task(&orphan).await.unwrap();
        let pending = store.create_task("alice", "Pending").await.unwrap();
        store
            .put_session(&Session::open("alice", pending.id, Utc::now()))
            .await
            .unwrap();

        let tasks_before = store.list_tasks("alice").await.unwrap();
        let sessions_before = store.list_sessions("alice").await.unwrap();

        let first = detect_issues(&store, Some("alice")).await.unwrap();
        let second = detect_issues(&store, Some("alice")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.summary.total, 2);
        assert_eq!(store.list_tasks("alice").await.unwrap(), tasks_before);
        assert_eq!(store.list_sessions("alice").await.unwrap(), sessions_before);
    }
}
