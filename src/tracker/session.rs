//! Work sessions recorded against a task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A span of tracked work. Open while `ended_at` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    /// Owner, copied from the task so predicates can stay owner-scoped
    pub user_id: String,
    pub task_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Why the session was closed, when closed by reconciliation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<String>,
}

impl Session {
    /// Start a new open session for `task_id`.
    pub fn open(user_id: impl Into<String>, task_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            task_id,
            started_at: super::stored_precision(started_at),
            ended_at: None,
            end_reason: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    pub fn close(&mut self, at: DateTime<Utc>, reason: Option<&str>) {
        self.ended_at = Some(super::stored_precision(at));
        self.end_reason = reason.map(|r| r.to_string());
    }
}
