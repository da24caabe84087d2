//! SQLite-based tracker store.

use super::{timestamp_string, OpenSession, StoreError, StoreResult, TrackerStore};
use crate::tracker::{Session, Task, TaskStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    current_session_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_tasks_user_status ON tasks(user_id, status);
CREATE INDEX IF NOT EXISTS idx_tasks_user_created ON tasks(user_id, created_at);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    task_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    end_reason TEXT
);

CREATE INDEX IF NOT EXISTS idx_sessions_user_open ON sessions(user_id, ended_at);
CREATE INDEX IF NOT EXISTS idx_sessions_task ON sessions(task_id);
"#;

/// SQL fragment matching `TaskStatus::ACTIVE_LIKE`.
const ACTIVE_LIKE_SQL: &str = "('in_progress', 'active')";

const TASK_COLUMNS: &str =
    "id, user_id, title, status, current_session_id, created_at, updated_at, deleted_at";

const SESSION_COLUMNS: &str = "id, user_id, task_id, started_at, ended_at, end_reason";

/// Raw task columns as stored; converted with `TryFrom` outside the row
/// closure so parse failures become `StoreError::Corrupt`.
struct TaskRow {
    id: String,
    user_id: String,
    title: String,
    status: String,
    current_session_id: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl TaskRow {
    fn read(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(offset)?,
            user_id: row.get(offset + 1)?,
            title: row.get(offset + 2)?,
            status: row.get(offset + 3)?,
            current_session_id: row.get(offset + 4)?,
            created_at: row.get(offset + 5)?,
            updated_at: row.get(offset + 6)?,
            deleted_at: row.get(offset + 7)?,
        })
    }
}

struct SessionRow {
    id: String,
    user_id: String,
    task_id: String,
    started_at: String,
    ended_at: Option<String>,
    end_reason: Option<String>,
}

impl SessionRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            task_id: row.get(2)?,
            started_at: row.get(3)?,
            ended_at: row.get(4)?,
            end_reason: row.get(5)?,
        })
    }
}

fn parse_uuid(value: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| StoreError::Corrupt(format!("bad id {}: {}", value, e)))
}

fn parse_time(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {}: {}", value, e)))
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> StoreResult<Self> {
        Ok(Task {
            id: parse_uuid(&row.id)?,
            user_id: row.user_id,
            title: row.title,
            status: row
                .status
                .parse::<TaskStatus>()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            current_session_id: row.current_session_id.as_deref().map(parse_uuid).transpose()?,
            created_at: parse_time(&row.created_at)?,
            updated_at: parse_time(&row.updated_at)?,
            deleted_at: row.deleted_at.as_deref().map(parse_time).transpose()?,
        })
    }
}

impl TryFrom<SessionRow> for Session {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> StoreResult<Self> {
        Ok(Session {
            id: parse_uuid(&row.id)?,
            user_id: row.user_id,
            task_id: parse_uuid(&row.task_id)?,
            started_at: parse_time(&row.started_at)?,
            ended_at: row.ended_at.as_deref().map(parse_time).transpose()?,
            end_reason: row.end_reason,
        })
    }
}

fn query_tasks(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> StoreResult<Vec<Task>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| TaskRow::read(row, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(Task::try_from).collect()
}

fn query_sessions(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> StoreResult<Vec<Session>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, SessionRow::read)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(Session::try_from).collect()
}

fn load_task(conn: &Connection, owner: &str, id: Uuid) -> StoreResult<Option<Task>> {
    let sql = format!(
        "SELECT {} FROM tasks WHERE id = ?1 AND user_id = ?2 AND deleted_at IS NULL",
        TASK_COLUMNS
    );
    let row = conn
        .query_row(&sql, params![id.to_string(), owner], |row| {
            TaskRow::read(row, 0)
        })
        .optional()?;
    row.map(Task::try_from).transpose()
}

fn load_session(conn: &Connection, owner: &str, id: Uuid) -> StoreResult<Option<Session>> {
    let sql = format!(
        "SELECT {} FROM sessions WHERE id = ?1 AND user_id = ?2",
        SESSION_COLUMNS
    );
    let row = conn
        .query_row(&sql, params![id.to_string(), owner], SessionRow::read)
        .optional()?;
    row.map(Session::try_from).transpose()
}

fn write_task(conn: &Connection, task: &Task) -> StoreResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO tasks
         (id, user_id, title, status, current_session_id, created_at, updated_at, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            task.id.to_string(),
            task.user_id,
            task.title,
            task.status.as_str(),
            task.current_session_id.map(|id| id.to_string()),
            timestamp_string(task.created_at),
            timestamp_string(task.updated_at),
            task.deleted_at.map(timestamp_string),
        ],
    )?;
    Ok(())
}

fn write_session(conn: &Connection, session: &Session) -> StoreResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO sessions
         (id, user_id, task_id, started_at, ended_at, end_reason)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            session.id.to_string(),
            session.user_id,
            session.task_id.to_string(),
            timestamp_string(session.started_at),
            session.ended_at.map(timestamp_string),
            session.end_reason,
        ],
    )?;
    Ok(())
}

pub struct SqliteTrackerStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTrackerStore {
    pub async fn new(data_dir: PathBuf) -> StoreResult<Self> {
        tokio::fs::create_dir_all(&data_dir).await?;
        let db_path = data_dir.join("tracker.db");

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            conn.execute_batch(SCHEMA)?;
            tracing::debug!("Opened tracker database at {}", db_path.display());
            Ok::<_, StoreError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut conn)
        })
        .await?
    }
}

#[async_trait]
impl TrackerStore for SqliteTrackerStore {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn create_task(&self, owner: &str, title: &str) -> StoreResult<Task> {
        let task = Task::new(owner, title);
        let row = task.clone();
        self.with_conn(move |conn| write_task(conn, &row)).await?;
        Ok(task)
    }

    async fn get_task(&self, owner: &str, id: Uuid) -> StoreResult<Option<Task>> {
        let owner = owner.to_string();
        self.with_conn(move |conn| load_task(conn, &owner, id)).await
    }

    async fn list_tasks(&self, owner: &str) -> StoreResult<Vec<Task>> {
        let owner = owner.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM tasks WHERE user_id = ?1 AND deleted_at IS NULL
                 ORDER BY created_at ASC, id ASC",
                TASK_COLUMNS
            );
            query_tasks(conn, &sql, params![owner])
        })
        .await
    }

    async fn list_tasks_with_status(
        &self,
        owner: &str,
        statuses: &[TaskStatus],
    ) -> StoreResult<Vec<Task>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let mut values: Vec<String> = vec![owner.to_string()];
        values.extend(statuses.iter().map(|s| s.as_str().to_string()));
        self.with_conn(move |conn| {
            let placeholders = (2..=values.len())
                .map(|i| format!("?{}", i))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT {} FROM tasks
                 WHERE user_id = ?1 AND deleted_at IS NULL
                   AND status IN ({})
                 ORDER BY created_at ASC, id ASC",
                TASK_COLUMNS, placeholders
            );
            query_tasks(conn, &sql, params_from_iter(values.iter()))
        })
        .await
    }

    async fn set_task_status(
        &self,
        owner: &str,
        id: Uuid,
        status: TaskStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let owner = owner.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE tasks SET status = ?1, updated_at = ?2
                 WHERE id = ?3 AND user_id = ?4 AND deleted_at IS NULL",
                params![status.as_str(), timestamp_string(at), id.to_string(), owner],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn delete_task(&self, owner: &str, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let owner = owner.to_string();
        self.with_conn(move |conn| {
            let now = timestamp_string(at);
            let changed = conn.execute(
                "UPDATE tasks SET deleted_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND user_id = ?3 AND deleted_at IS NULL",
                params![now, id.to_string(), owner],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn start_session(
        &self,
        owner: &str,
        task_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Session> {
        let owner = owner.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let task = load_task(&tx, &owner, task_id)?.ok_or(StoreError::NotFound {
                entity: "Task",
                id: task_id,
            })?;

            if let Some(current) = task.current_session_id {
                if load_session(&tx, &owner, current)?.is_some_and(|s| s.is_open()) {
                    return Err(StoreError::Conflict(format!(
                        "Task {} already has open session {}",
                        task_id, current
                    )));
                }
            }

            let session = Session::open(owner.as_str(), task_id, at);
            write_session(&tx, &session)?;
            tx.execute(
                "UPDATE tasks SET status = ?1, current_session_id = ?2, updated_at = ?3
                 WHERE id = ?4 AND user_id = ?5",
                params![
                    TaskStatus::Active.as_str(),
                    session.id.to_string(),
                    timestamp_string(at),
                    task_id.to_string(),
                    owner,
                ],
            )?;
            tx.commit()?;
            Ok(session)
        })
        .await
    }

    async fn stop_session(
        &self,
        owner: &str,
        task_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Session>> {
        let owner = owner.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let task = load_task(&tx, &owner, task_id)?.ok_or(StoreError::NotFound {
                entity: "Task",
                id: task_id,
            })?;

            let Some(session_id) = task.current_session_id else {
                return Ok(None);
            };
            let mut session = match load_session(&tx, &owner, session_id)? {
                Some(session) if session.is_open() => session,
                _ => return Ok(None),
            };

            session.close(at, None);
            let now = timestamp_string(at);
            tx.execute(
                "UPDATE sessions SET ended_at = ?1 WHERE id = ?2 AND user_id = ?3",
                params![now, session_id.to_string(), owner],
            )?;
            tx.execute(
                "UPDATE tasks SET status = ?1, current_session_id = NULL, updated_at = ?2
                 WHERE id = ?3 AND user_id = ?4",
                params![TaskStatus::Paused.as_str(), now, task_id.to_string(), owner],
            )?;
            tx.commit()?;
            Ok(Some(session))
        })
        .await
    }

    async fn get_session(&self, owner: &str, id: Uuid) -> StoreResult<Option<Session>> {
        let owner = owner.to_string();
        self.with_conn(move |conn| load_session(conn, &owner, id))
            .await
    }

    async fn list_sessions(&self, owner: &str) -> StoreResult<Vec<Session>> {
        let owner = owner.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM sessions WHERE user_id = ?1 ORDER BY started_at ASC, id ASC",
                SESSION_COLUMNS
            );
            query_sessions(conn, &sql, params![owner])
        })
        .await
    }

    async fn list_open_sessions(&self, owner: &str) -> StoreResult<Vec<OpenSession>> {
        let owner = owner.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.user_id, s.task_id, s.started_at, s.ended_at, s.end_reason,
                        t.id, t.user_id, t.title, t.status, t.current_session_id,
                        t.created_at, t.updated_at, t.deleted_at
                 FROM sessions s
                 LEFT JOIN tasks t
                   ON t.id = s.task_id AND t.user_id = s.user_id AND t.deleted_at IS NULL
                 WHERE s.user_id = ?1 AND s.ended_at IS NULL
                 ORDER BY s.started_at ASC, s.id ASC",
            )?;
            let rows = stmt
                .query_map(params![owner], |row| {
                    let session = SessionRow::read(row)?;
                    let joined: Option<String> = row.get(6)?;
                    let task = match joined {
                        Some(_) => Some(TaskRow::read(row, 6)?),
                        None => None,
                    };
                    Ok((session, task))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(session, task)| -> StoreResult<OpenSession> {
                    Ok(OpenSession {
                        session: Session::try_from(session)?,
                        task: task.map(Task::try_from).transpose()?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn release_task(
        &self,
        owner: &str,
        id: Uuid,
        expected_session: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let owner = owner.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "UPDATE tasks SET status = 'pending', current_session_id = NULL, updated_at = ?1
                 WHERE id = ?2 AND user_id = ?3 AND deleted_at IS NULL
                   AND status IN {}
                   AND current_session_id IS ?4",
                ACTIVE_LIKE_SQL
            );
            let changed = conn.execute(
                &sql,
                params![
                    timestamp_string(at),
                    id.to_string(),
                    owner,
                    expected_session.map(|s| s.to_string()),
                ],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn end_orphaned_session(
        &self,
        owner: &str,
        id: Uuid,
        at: DateTime<Utc>,
        reason: &str,
    ) -> StoreResult<bool> {
        let owner = owner.to_string();
        let reason = reason.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "UPDATE sessions SET ended_at = ?1, end_reason = ?2
                 WHERE id = ?3 AND user_id = ?4 AND ended_at IS NULL
                   AND NOT EXISTS (
                     SELECT 1 FROM tasks t
                     WHERE t.id = sessions.task_id AND t.user_id = sessions.user_id
                       AND t.deleted_at IS NULL AND t.status IN {}
                   )",
                ACTIVE_LIKE_SQL
            );
            let changed = conn.execute(
                &sql,
                params![timestamp_string(at), reason, id.to_string(), owner],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn close_task_sessions(
        &self,
        owner: &str,
        task_id: Uuid,
        at: DateTime<Utc>,
        reason: &str,
    ) -> StoreResult<usize> {
        let owner = owner.to_string();
        let reason = reason.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE sessions SET ended_at = ?1, end_reason = ?2
                 WHERE task_id = ?3 AND user_id = ?4 AND ended_at IS NULL",
                params![timestamp_string(at), reason, task_id.to_string(), owner],
            )?;
            Ok(changed)
        })
        .await
    }

    async fn reset_task(&self, owner: &str, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let owner = owner.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE tasks SET status = 'pending', current_session_id = NULL, updated_at = ?1
                 WHERE id = ?2 AND user_id = ?3 AND deleted_at IS NULL",
                params![timestamp_string(at), id.to_string(), owner],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn put_task(&self, task: &Task) -> StoreResult<()> {
        let task = task.clone();
        self.with_conn(move |conn| write_task(conn, &task)).await
    }

    async fn put_session(&self, session: &Session) -> StoreResult<()> {
        let session = session.clone();
        self.with_conn(move |conn| write_session(conn, &session))
            .await
    }
}
