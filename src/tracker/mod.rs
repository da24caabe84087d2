//! Tracker module - defines tasks and the work sessions recorded against them.
//!
//! A task points at its current session through `current_session_id`. The
//! pointer is a lookup key only; the session lives in its own table and is
//! never owned by the task.
//!
//! # Invariants
//! - I1: an active-like task references an existing, open session
//! - I2: a task with no open session referencing it is not active-like

mod session;
pub mod task;

pub use session::Session;
pub use task::{Task, TaskStatus, UnknownStatus};

use chrono::{DateTime, SubsecRound, Utc};

/// Truncate a timestamp to the microsecond precision every store keeps.
pub fn stored_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

/// Current time at stored precision.
pub fn now() -> DateTime<Utc> {
    stored_precision(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_precision_drops_sub_microseconds() {
        let at = DateTime::parse_from_rfc3339("2024-03-01T10:00:00.123456789Z")
            .unwrap()
            .with_timezone(&Utc);
        let truncated = stored_precision(at);
        assert_eq!(truncated.timestamp_subsec_nanos(), 123_456_000);
        assert_eq!(stored_precision(truncated), truncated);
        assert_eq!(now().timestamp_subsec_nanos() % 1_000, 0);
    }
}
