//! Task/session storage with pluggable backends.
//!
//! Supports:
//! - `memory`: In-memory storage (non-persistent, for testing)
//! - `sqlite`: SQLite database
//!
//! Every method takes the owner id and every predicate is scoped by it, so a
//! row belonging to another user behaves exactly like a missing row.

mod memory;
mod sqlite;

pub use memory::InMemoryTrackerStore;
pub use sqlite::SqliteTrackerStore;

use crate::tracker::{Session, Task, TaskStatus};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// An open session together with the task it points at.
///
/// `task` is `None` when the task does not exist, is soft-deleted, or
/// belongs to someone else.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenSession {
    pub session: Session,
    pub task: Option<Task>,
}

/// Format a timestamp for storage. Fixed width so text ordering is
/// chronological.
pub fn timestamp_string(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Tracker store trait - implemented by all storage backends.
#[async_trait]
pub trait TrackerStore: Send + Sync {
    /// Whether this store persists data across restarts.
    fn is_persistent(&self) -> bool;

    /// Create a new pending task.
    async fn create_task(&self, owner: &str, title: &str) -> StoreResult<Task>;

    /// Get a single (non-deleted) task.
    async fn get_task(&self, owner: &str, id: Uuid) -> StoreResult<Option<Task>>;

    /// List non-deleted tasks ordered by `(created_at, id)`.
    async fn list_tasks(&self, owner: &str) -> StoreResult<Vec<Task>>;

    /// List non-deleted tasks whose status is one of `statuses`, ordered by
    /// `(created_at, id)`.
    async fn list_tasks_with_status(
        &self,
        owner: &str,
        statuses: &[TaskStatus],
    ) -> StoreResult<Vec<Task>>;

    /// Set a task's status without touching its session reference.
    /// Returns false when no row matched.
    async fn set_task_status(
        &self,
        owner: &str,
        id: Uuid,
        status: TaskStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Soft-delete a task. Its sessions are left as they are.
    async fn delete_task(&self, owner: &str, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Open a session for a task and mark the task active.
    ///
    /// Fails with `NotFound` for an unknown task and `Conflict` when the
    /// task's current session is still open.
    async fn start_session(
        &self,
        owner: &str,
        task_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Session>;

    /// Close the task's current session and pause the task.
    ///
    /// Returns the closed session, or `None` when the task had no open
    /// current session (the task is left untouched).
    async fn stop_session(
        &self,
        owner: &str,
        task_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Session>>;

    /// Get a single session.
    async fn get_session(&self, owner: &str, id: Uuid) -> StoreResult<Option<Session>>;

    /// List all sessions ordered by `(started_at, id)`.
    async fn list_sessions(&self, owner: &str) -> StoreResult<Vec<Session>>;

    /// List open sessions joined with their task, ordered by
    /// `(started_at, id)`.
    async fn list_open_sessions(&self, owner: &str) -> StoreResult<Vec<OpenSession>>;

    /// Move an orphaned task back to pending.
    ///
    /// Only applies while the task is still active-like and still references
    /// `expected_session`. Returns false when the predicate no longer holds.
    async fn release_task(
        &self,
        owner: &str,
        id: Uuid,
        expected_session: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Close an orphaned session.
    ///
    /// Only applies while the session is still open and its task is still
    /// missing or not active-like. Returns false when the predicate no longer
    /// holds.
    async fn end_orphaned_session(
        &self,
        owner: &str,
        id: Uuid,
        at: DateTime<Utc>,
        reason: &str,
    ) -> StoreResult<bool>;

    /// Close every open session of a task. Returns how many were closed.
    async fn close_task_sessions(
        &self,
        owner: &str,
        task_id: Uuid,
        at: DateTime<Utc>,
        reason: &str,
    ) -> StoreResult<usize>;

    /// Unconditionally reset a task to pending with no session reference.
    async fn reset_task(&self, owner: &str, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Insert or replace a task row as-is (imports and fixtures).
    async fn put_task(&self, task: &Task) -> StoreResult<()>;

    /// Insert or replace a session row as-is (imports and fixtures).
    async fn put_session(&self, session: &Session) -> StoreResult<()>;
}

pub type SharedStore = Arc<dyn TrackerStore>;

/// Store type selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreType {
    Memory,
    #[default]
    Sqlite,
}

impl StoreType {
    /// Parse from environment variable value.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "memory" => Self::Memory,
            "sqlite" | "db" => Self::Sqlite,
            _ => Self::default(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Create a tracker store based on type and configuration.
pub async fn create_tracker_store(
    store_type: StoreType,
    data_dir: PathBuf,
) -> StoreResult<SharedStore> {
    match store_type {
        StoreType::Memory => Ok(Arc::new(InMemoryTrackerStore::new())),
        StoreType::Sqlite => {
            let store = SqliteTrackerStore::new(data_dir).await?;
            Ok(Arc::new(store))
        }
    }
}
