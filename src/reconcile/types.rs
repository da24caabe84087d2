//! Reports produced by the reconciliation operations.

use crate::tracker::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    /// Task is active-like but has no open session behind it
    OrphanedTask,
    /// Session is open but its task is not active-like (or gone)
    OrphanedSession,
}

/// Why an active-like task was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanCause {
    /// `current_session_id` is null
    NoSessionReference,
    /// The referenced session does not exist (for this owner)
    SessionMissing,
    /// The referenced session has already ended
    SessionClosed,
}

impl OrphanCause {
    fn describe(self) -> &'static str {
        match self {
            OrphanCause::NoSessionReference => "has no current session",
            OrphanCause::SessionMissing => "references a session that does not exist",
            OrphanCause::SessionClosed => "references a session that has already ended",
        }
    }
}

/// A single detected mismatch between a task's status and its sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Violation {
    OrphanedTask {
        task_id: Uuid,
        title: String,
        status: TaskStatus,
        current_session_id: Option<Uuid>,
        cause: OrphanCause,
        description: String,
    },
    OrphanedSession {
        session_id: Uuid,
        task_id: Uuid,
        started_at: DateTime<Utc>,
        task_title: Option<String>,
        task_status: Option<TaskStatus>,
        description: String,
    },
}

impl Violation {
    pub fn orphaned_task(
        task_id: Uuid,
        title: &str,
        status: TaskStatus,
        current_session_id: Option<Uuid>,
        cause: OrphanCause,
    ) -> Self {
        Violation::OrphanedTask {
            task_id,
            title: title.to_string(),
            status,
            current_session_id,
            cause,
            description: format!(
                "Task \"{}\" is marked {} but {}",
                title,
                status,
                cause.describe()
            ),
        }
    }

    pub fn orphaned_session(
        session_id: Uuid,
        task_id: Uuid,
        started_at: DateTime<Utc>,
        task: Option<(&str, TaskStatus)>,
    ) -> Self {
        let description = match task {
            Some((title, status)) => format!(
                "Session started {} is still open but task \"{}\" is {}",
                started_at.to_rfc3339(),
                title,
                status
            ),
            None => format!(
                "Session started {} is still open but its task no longer exists",
                started_at.to_rfc3339()
            ),
        };
        Violation::OrphanedSession {
            session_id,
            task_id,
            started_at,
            task_title: task.map(|(title, _)| title.to_string()),
            task_status: task.map(|(_, status)| status),
            description,
        }
    }

    pub fn kind(&self) -> ViolationKind {
        match self {
            Violation::OrphanedTask { .. } => ViolationKind::OrphanedTask,
            Violation::OrphanedSession { .. } => ViolationKind::OrphanedSession,
        }
    }

    pub fn task_id(&self) -> Uuid {
        match self {
            Violation::OrphanedTask { task_id, .. } | Violation::OrphanedSession { task_id, .. } => {
                *task_id
            }
        }
    }

    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            Violation::OrphanedTask {
                current_session_id, ..
            } => *current_session_id,
            Violation::OrphanedSession { session_id, .. } => Some(*session_id),
        }
    }
}

/// Violation counts grouped by kind.
///
/// # Invariants
/// - `total == orphaned_tasks + orphaned_sessions`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationSummary {
    pub orphaned_tasks: usize,
    pub orphaned_sessions: usize,
    pub total: usize,
}

impl ViolationSummary {
    pub fn from_violations(violations: &[Violation]) -> Self {
        let orphaned_tasks = violations
            .iter()
            .filter(|v| v.kind() == ViolationKind::OrphanedTask)
            .count();
        let orphaned_sessions = violations.len() - orphaned_tasks;
        Self {
            orphaned_tasks,
            orphaned_sessions,
            total: violations.len(),
        }
    }
}

/// Output of `detect_issues`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub issues: Vec<Violation>,
    pub summary: ViolationSummary,
}

impl DetectionReport {
    pub fn new(issues: Vec<Violation>) -> Self {
        let summary = ViolationSummary::from_violations(&issues);
        Self { issues, summary }
    }

    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }
}

/// What happened to one violation during a bulk fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum FixResult {
    /// The corrective update was applied
    Fixed,
    /// The row no longer matched the expected state; someone else fixed it
    Skipped,
    /// The store rejected the update
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixOutcome {
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    pub task_id: Uuid,
    pub session_id: Option<Uuid>,
    #[serde(flatten)]
    pub result: FixResult,
}

/// Output of `fix_issues`.
///
/// # Invariants
/// - `fixed` equals the number of `FixResult::Fixed` outcomes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixReport {
    pub fixed: usize,
    pub message: String,
    pub outcomes: Vec<FixOutcome>,
}

impl FixReport {
    pub fn new(outcomes: Vec<FixOutcome>) -> Self {
        let fixed = outcomes
            .iter()
            .filter(|o| o.result == FixResult::Fixed)
            .count();
        let failed = outcomes
            .iter()
            .filter(|o| matches!(o.result, FixResult::Failed { .. }))
            .count();
        let message = if outcomes.is_empty() {
            "No issues found".to_string()
        } else if failed > 0 {
            format!("Fixed {} issues ({} could not be fixed)", fixed, failed)
        } else {
            format!("Fixed {} issues", fixed)
        };
        Self {
            fixed,
            message,
            outcomes,
        }
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, FixResult::Failed { .. }))
            .count()
    }
}

/// Output of `reset_task`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetOutcome {
    pub task_id: Uuid,
    pub sessions_closed: usize,
    /// False when the task was not found for this owner (a silent no-op)
    pub reset: bool,
    pub message: String,
}
