//! Run records and their state machine.
//!
//! A `RunRecord` is one scheduled execution attempt. Records live in the
//! run registry and are mutated only through it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::{GroupKey, TriggerEvent};

/// Unique identifier of a run record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One scheduled/execution attempt within a concurrency group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique identifier for this run
    pub id: RunId,

    /// The concurrency group this run competes in
    pub group_key: GroupKey,

    /// The trigger event that created this run
    pub source: TriggerEvent,

    /// Current state
    pub state: RunState,

    /// Whether this run is immune to cancellation by unprotected events.
    /// Derived from the source class at admission; policy can add
    /// protection to further classes but can never remove it.
    pub protected: bool,

    /// Coordinator-assigned monotonic admission counter. This, not the
    /// source event's `observed_at`, decides which run survives a tie.
    pub created_at: u64,

    /// Wall-clock admission time (audit only)
    pub admitted_at: DateTime<Utc>,

    /// Wall-clock time the run reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    /// Create a new queued run for an admitted event.
    pub fn new(
        group_key: GroupKey,
        source: TriggerEvent,
        protected: bool,
        created_at: u64,
    ) -> Self {
        Self {
            id: RunId::new(),
            group_key,
            source,
            state: RunState::Queued,
            protected,
            created_at,
            admitted_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Whether the run still occupies its group (queued or running).
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Whether the run has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// State of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunState {
    /// Admitted, waiting for the executor to pick it up
    Queued,

    /// Executor acknowledged the start request
    Running,

    /// Superseded by a newer run in the same group
    Canceled,

    /// Executor reported success
    Completed,

    /// Executor reported failure, or the coordinator gave up on dispatch
    Failed { reason: FailureReason },
}

impl RunState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

/// Why a run ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The external executor reported the run as failed
    ExecutorReported,

    /// No executor acknowledgment within the dispatch timeout. Surfaced
    /// as a user-visible failure, never silently retried.
    DispatchTimeout,
}

/// Terminal outcome reported by the external executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Failure,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::EventClass;

    fn push_event() -> TriggerEvent {
        TriggerEvent {
            class: EventClass::Push,
            ref_name: "main".to_string(),
            commit_sha: Some("a".repeat(40)),
            head_sha: None,
            pull_request_number: None,
            head_ref: None,
            base_ref: None,
            compare_url: None,
            observed_at: 0,
        }
    }

    #[test]
    fn test_new_run_is_queued() {
        let key = GroupKey::new("ci", "main");
        let run = RunRecord::new(key.clone(), push_event(), false, 7);

        assert_eq!(run.state, RunState::Queued);
        assert_eq!(run.group_key, key);
        assert_eq!(run.created_at, 7);
        assert!(run.is_active());
        assert!(run.finished_at.is_none());
    }

    #[test]
    fn test_state_activity() {
        assert!(RunState::Queued.is_active());
        assert!(RunState::Running.is_active());
        assert!(RunState::Canceled.is_terminal());
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Failed {
            reason: FailureReason::DispatchTimeout
        }
        .is_terminal());
    }

    #[test]
    fn test_state_serialization() {
        let state = RunState::Failed {
            reason: FailureReason::DispatchTimeout,
        };
        let json = serde_json::to_string(&state).unwrap();
        let parsed: RunState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
        assert!(json.contains("dispatch_timeout"));
    }
}
