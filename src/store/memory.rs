//! In-memory tracker store (non-persistent).

use super::{OpenSession, StoreError, StoreResult, TrackerStore};
use crate::tracker::{stored_precision, Session, Task, TaskStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    tasks: HashMap<Uuid, Task>,
    sessions: HashMap<Uuid, Session>,
}

impl Tables {
    fn task(&self, owner: &str, id: Uuid) -> Option<&Task> {
        self.tasks
            .get(&id)
            .filter(|t| t.user_id == owner && !t.is_deleted())
    }

    fn task_mut(&mut self, owner: &str, id: Uuid) -> Option<&mut Task> {
        self.tasks
            .get_mut(&id)
            .filter(|t| t.user_id == owner && !t.is_deleted())
    }

    fn session(&self, owner: &str, id: Uuid) -> Option<&Session> {
        self.sessions.get(&id).filter(|s| s.user_id == owner)
    }

    fn session_mut(&mut self, owner: &str, id: Uuid) -> Option<&mut Session> {
        self.sessions.get_mut(&id).filter(|s| s.user_id == owner)
    }

    fn owned_tasks<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = &'a Task> + 'a {
        self.tasks
            .values()
            .filter(move |t| t.user_id == owner && !t.is_deleted())
    }
}

fn sorted_tasks(mut tasks: Vec<Task>) -> Vec<Task> {
    tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    tasks
}

fn sorted_sessions(mut sessions: Vec<Session>) -> Vec<Session> {
    sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
    sessions
}

#[derive(Clone)]
pub struct InMemoryTrackerStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryTrackerStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
        }
    }
}

impl Default for InMemoryTrackerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackerStore for InMemoryTrackerStore {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn create_task(&self, owner: &str, title: &str) -> StoreResult<Task> {
        let task = Task::new(owner, title);
        self.tables
            .write()
            .await
            .tasks
            .insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, owner: &str, id: Uuid) -> StoreResult<Option<Task>> {
        Ok(self.tables.read().await.task(owner, id).cloned())
    }

    async fn list_tasks(&self, owner: &str) -> StoreResult<Vec<Task>> {
        let tables = self.tables.read().await;
        Ok(sorted_tasks(tables.owned_tasks(owner).cloned().collect()))
    }

    async fn list_tasks_with_status(
        &self,
        owner: &str,
        statuses: &[TaskStatus],
    ) -> StoreResult<Vec<Task>> {
        let tables = self.tables.read().await;
        let tasks = tables
            .owned_tasks(owner)
            .filter(|t| statuses.contains(&t.status))
            .cloned()
            .collect();
        Ok(sorted_tasks(tasks))
    }

    async fn set_task_status(
        &self,
        owner: &str,
        id: Uuid,
        status: TaskStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let at = stored_precision(at);
        let mut tables = self.tables.write().await;
        match tables.task_mut(owner, id) {
            Some(task) => {
                task.status = status;
                task.updated_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_task(&self, owner: &str, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let at = stored_precision(at);
        let mut tables = self.tables.write().await;
        match tables.task_mut(owner, id) {
            Some(task) => {
                task.deleted_at = Some(at);
                task.updated_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn start_session(
        &self,
        owner: &str,
        task_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Session> {
        let at = stored_precision(at);
        let mut tables = self.tables.write().await;
        let current = tables
            .task(owner, task_id)
            .ok_or(StoreError::NotFound {
                entity: "Task",
                id: task_id,
            })?
            .current_session_id;

        if let Some(current) = current {
            if tables.session(owner, current).is_some_and(|s| s.is_open()) {
                return Err(StoreError::Conflict(format!(
                    "Task {} already has open session {}",
                    task_id, current
                )));
            }
        }

        let session = Session::open(owner, task_id, at);
        tables.sessions.insert(session.id, session.clone());
        if let Some(task) = tables.task_mut(owner, task_id) {
            task.status = TaskStatus::Active;
            task.current_session_id = Some(session.id);
            task.updated_at = at;
        }
        Ok(session)
    }

    async fn stop_session(
        &self,
        owner: &str,
        task_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Session>> {
        let at = stored_precision(at);
        let mut tables = self.tables.write().await;
        let current = tables
            .task(owner, task_id)
            .ok_or(StoreError::NotFound {
                entity: "Task",
                id: task_id,
            })?
            .current_session_id;

        let Some(session_id) = current else {
            return Ok(None);
        };
        let closed = match tables.session_mut(owner, session_id) {
            Some(session) if session.is_open() => {
                session.close(at, None);
                session.clone()
            }
            _ => return Ok(None),
        };
        if let Some(task) = tables.task_mut(owner, task_id) {
            task.status = TaskStatus::Paused;
            task.current_session_id = None;
            task.updated_at = at;
        }
        Ok(Some(closed))
    }

    async fn get_session(&self, owner: &str, id: Uuid) -> StoreResult<Option<Session>> {
        Ok(self.tables.read().await.session(owner, id).cloned())
    }

    async fn list_sessions(&self, owner: &str) -> StoreResult<Vec<Session>> {
        let tables = self.tables.read().await;
        let sessions = tables
            .sessions
            .values()
            .filter(|s| s.user_id == owner)
            .cloned()
            .collect();
        Ok(sorted_sessions(sessions))
    }

    async fn list_open_sessions(&self, owner: &str) -> StoreResult<Vec<OpenSession>> {
        let tables = self.tables.read().await;
        let open = tables
            .sessions
            .values()
            .filter(|s| s.user_id == owner && s.is_open())
            .cloned()
            .collect();
        Ok(sorted_sessions(open)
            .into_iter()
            .map(|session| {
                let task = tables.task(owner, session.task_id).cloned();
                OpenSession { session, task }
            })
            .collect())
    }

    async fn release_task(
        &self,
        owner: &str,
        id: Uuid,
        expected_session: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.task_mut(owner, id) {
            Some(task)
                if task.status.is_active_like()
                    && task.current_session_id == expected_session =>
            {
                task.reset_to_pending(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn end_orphaned_session(
        &self,
        owner: &str,
        id: Uuid,
        at: DateTime<Utc>,
        reason: &str,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let task_id = match tables.session(owner, id) {
            Some(session) if session.is_open() => session.task_id,
            _ => return Ok(false),
        };
        if tables
            .task(owner, task_id)
            .is_some_and(|t| t.status.is_active_like())
        {
            return Ok(false);
        }
        if let Some(session) = tables.session_mut(owner, id) {
            session.close(at, Some(reason));
        }
        Ok(true)
    }

    async fn close_task_sessions(
        &self,
        owner: &str,
        task_id: Uuid,
        at: DateTime<Utc>,
        reason: &str,
    ) -> StoreResult<usize> {
        let mut tables = self.tables.write().await;
        let mut closed = 0;
        for session in tables
            .sessions
            .values_mut()
            .filter(|s| s.user_id == owner && s.task_id == task_id && s.is_open())
        {
            session.close(at, Some(reason));
            closed += 1;
        }
        Ok(closed)
    }

    async fn reset_task(&self, owner: &str, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.task_mut(owner, id) {
            Some(task) => {
                task.reset_to_pending(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn put_task(&self, task: &Task) -> StoreResult<()> {
        let mut task = task.clone();
        task.created_at = stored_precision(task.created_at);
        task.updated_at = stored_precision(task.updated_at);
        task.deleted_at = task.deleted_at.map(stored_precision);
        self.tables.write().await.tasks.insert(task.id, task);
        Ok(())
    }

    async fn put_session(&self, session: &Session) -> StoreResult<()> {
        let mut session = session.clone();
        session.started_at = stored_precision(session.started_at);
        session.ended_at = session.ended_at.map(stored_precision);
        self.tables.write().await.sessions.insert(session.id, session);
        Ok(())
    }
}
