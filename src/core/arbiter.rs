//! Cancellation arbitration.
//!
//! Given a newly admitted event and the existing runs in its group, decide
//! which of those runs must be canceled. Pure: the scheduler applies the
//! decision atomically against the registry.
//!
//! The one rule that must hold regardless of configuration: a protected
//! run (merge-queue check) is never canceled by an unprotected event. A
//! wrongly canceled queue check evicts the merge from its queue, so the
//! rule lives here in code rather than in policy data.

use crate::config::ClassPolicy;
use crate::domain::{RunId, RunRecord, TriggerEvent};

/// The arbiter's verdict for one admission.
#[derive(Debug, Clone, Default)]
pub struct Decision {
    /// Runs in the same group to cancel before the new run is appended
    pub to_cancel: Vec<RunId>,
}

/// Decide which existing runs the arrival of `new_event` supersedes.
///
/// The new run itself is always admitted; only the cancellation set varies.
/// Queued runs are always supersedable; Running runs only when the class
/// policy says `cancel_in_progress`. Cancellation across the protected
/// boundary is blocked upward unconditionally and gated downward by
/// `protected_supersedes` (off by default).
pub fn decide(new_event: &TriggerEvent, policy: &ClassPolicy, existing: &[RunRecord]) -> Decision {
    let new_protected = new_event.is_protected() || policy.protected;

    let mut to_cancel = Vec::new();
    for run in existing {
        if !run.is_active() {
            continue;
        }

        // Hard rule: unprotected events never cancel protected runs.
        if run.protected && !new_protected {
            continue;
        }

        // Protected superseding unprotected is configurable, default off.
        if new_protected && !run.protected && !policy.protected_supersedes {
            continue;
        }

        let cancelable = matches!(run.state, crate::domain::RunState::Queued)
            || policy.cancel_in_progress;
        if cancelable {
            to_cancel.push(run.id);
        }
    }

    Decision { to_cancel }
}
