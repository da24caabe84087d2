//! Core Task type and its status lifecycle.
//!
//! # Invariants
//! - `status.is_active_like()` implies `current_session_id.is_some()` once
//!   the store is consistent
//! - `user_id` never changes after creation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Status of a task in its lifecycle.
///
/// # State Machine
/// ```text
/// Pending -> Active/InProgress -> Paused
///                             \-> Completed
///        <- (reset / reconciliation)
/// ```
///
/// `InProgress` and `Active` are both written by clients and mean the same
/// thing: work is currently being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, no work tracked yet (or forced back here by a reset)
    Pending,
    /// Work in progress
    InProgress,
    /// Work in progress (alternate spelling used by the timer flow)
    Active,
    /// Finished
    Completed,
    /// Work stopped, may resume later
    Paused,
}

impl TaskStatus {
    /// Statuses that must be backed by an open session.
    pub const ACTIVE_LIKE: [TaskStatus; 2] = [TaskStatus::InProgress, TaskStatus::Active];

    /// Whether this status claims that work is currently running.
    pub fn is_active_like(self) -> bool {
        matches!(self, TaskStatus::InProgress | TaskStatus::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Active => "active",
            TaskStatus::Completed => "completed",
            TaskStatus::Paused => "paused",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored status string is not one we know.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown task status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for TaskStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "active" => Ok(TaskStatus::Active),
            "completed" => Ok(TaskStatus::Completed),
            "paused" => Ok(TaskStatus::Paused),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A task owned by a single user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    /// Owning user (the authenticated principal's id)
    pub user_id: String,
    pub title: String,
    pub status: TaskStatus,
    /// Session currently tracking work on this task, if any
    pub current_session_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker; deleted tasks are invisible to reads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending task.
    ///
    /// # Postcondition
    /// `status == Pending` and `current_session_id.is_none()`
    pub fn new(user_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = super::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            title: title.into(),
            status: TaskStatus::Pending,
            current_session_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Builder-style status override, mostly for seeding data.
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_current_session(mut self, session_id: Option<Uuid>) -> Self {
        self.current_session_id = session_id;
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Force the task back to the pending baseline.
    pub fn reset_to_pending(&mut self, at: DateTime<Utc>) {
        self.status = TaskStatus::Pending;
        self.current_session_id = None;
        self.updated_at = super::stored_precision(at);
    }
}
