//! Bulk correction of detected violations.

use super::detect::scan;
use super::{
    require_owner, FixOutcome, FixReport, FixResult, ReconcileError, Violation, ViolationKind,
    AUTO_END_NOT_ACTIVE,
};
use crate::store::{StoreResult, TrackerStore};
use crate::tracker;
use std::collections::HashSet;
use uuid::Uuid;

/// Upper bound on scan/apply passes in one call.
///
/// Releasing a task can orphan a second open session of that task, which
/// only shows up on the next scan. Bounded so a store that keeps reporting
/// the same rows cannot spin forever.
const MAX_PASSES: usize = 4;

/// Re-derive the owner's violations from live data and correct each one.
///
/// Per-item store errors are logged and recorded as `Failed` outcomes; only
/// a failure to read the violation set aborts the call. Each violation is
/// attempted at most once per call: items that failed or were skipped are
/// left out of later passes.
pub async fn fix_issues(
    store: &dyn TrackerStore,
    owner: Option<&str>,
) -> Result<FixReport, ReconcileError> {
    let owner = require_owner(owner)?;
    let mut outcomes = Vec::new();
    let mut settled: HashSet<(ViolationKind, Uuid, Option<Uuid>)> = HashSet::new();

    for pass in 1..=MAX_PASSES {
        let violations: Vec<Violation> = scan(store, owner)
            .await?
            .into_iter()
            .filter(|v| !settled.contains(&violation_key(v)))
            .collect();
        if violations.is_empty() {
            break;
        }

        tracing::info!(
            "[reconcile] fix pass {} for {}: {} violations",
            pass,
            owner,
            violations.len()
        );

        let mut progressed = false;
        for violation in &violations {
            let result = match apply(store, owner, violation).await {
                Ok(true) => {
                    progressed = true;
                    FixResult::Fixed
                }
                Ok(false) => {
                    tracing::debug!(
                        "[reconcile] {:?} for task {} no longer matches, skipped",
                        violation.kind(),
                        violation.task_id()
                    );
                    settled.insert(violation_key(violation));
                    FixResult::Skipped
                }
                Err(e) => {
                    tracing::warn!(
                        "[reconcile] failed to fix {:?} for task {}: {}",
                        violation.kind(),
                        violation.task_id(),
                        e
                    );
                    settled.insert(violation_key(violation));
                    FixResult::Failed {
                        error: e.to_string(),
                    }
                }
            };
            outcomes.push(FixOutcome {
                kind: violation.kind(),
                task_id: violation.task_id(),
                session_id: violation.session_id(),
                result,
            });
        }

        if !progressed {
            break;
        }
    }

    let report = FixReport::new(outcomes);
    tracing::info!("[reconcile] fix for {}: {}", owner, report.message);
    Ok(report)
}

fn violation_key(violation: &Violation) -> (ViolationKind, Uuid, Option<Uuid>) {
    (violation.kind(), violation.task_id(), violation.session_id())
}

/// Apply the corrective update for one violation. Returns false when the
/// row no longer matches the state the violation was derived from.
async fn apply(store: &dyn TrackerStore, owner: &str, violation: &Violation) -> StoreResult<bool> {
    let now = tracker::now();
    match violation {
        Violation::OrphanedTask {
            task_id,
            current_session_id,
            ..
        } => {
            store
                .release_task(owner, *task_id, *current_session_id, now)
                .await
        }
        Violation::OrphanedSession { session_id, .. } => {
            store
                .end_orphaned_session(owner, *session_id, now, AUTO_END_NOT_ACTIVE)
                .await
        }
    }
}
