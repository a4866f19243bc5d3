//! Scheduler/dispatcher: the engine's single ingestion surface.
//!
//! `submit` normalizes a raw event, resolves its concurrency group,
//! decides and admits atomically against the registry, and emits
//! start/cancel requests to the external executor. Completion and
//! start-acknowledgment callbacks flow back in through `complete` and
//! `mark_running`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::adapters::Executor;
use crate::config::CoordinatorConfig;
use crate::domain::{
    FailureReason, RawEvent, RunId, RunOutcome, RunRecord, RunState,
};

use super::arbiter;
use super::normalizer::{self, NormalizeError};
use super::registry::{RegistryError, RunRegistry, TransitionOutcome};
use super::resolver::{self, ResolveError};

/// Errors surfaced synchronously from `submit`.
///
/// Executor-side failures never appear here; they arrive later as
/// terminal run states via `complete`.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Malformed or incomplete input; rejected, not retried.
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    /// Policy/event mismatch; a configuration error for the operator.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Registry retries exhausted.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Result of one accepted submission.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// The newly admitted run (always Queued at return time)
    pub admitted: RunRecord,

    /// Runs superseded by this admission
    pub canceled: Vec<RunRecord>,
}

/// The coordination engine: normalizer, resolver, arbiter and registry
/// wired together behind one `submit` entry point.
pub struct Scheduler {
    config: CoordinatorConfig,
    registry: Arc<RunRegistry>,
    executor: Arc<dyn Executor>,
    ingest_seq: AtomicU64,
}

impl Scheduler {
    pub fn new(config: CoordinatorConfig, executor: Arc<dyn Executor>) -> Self {
        Self {
            config,
            registry: Arc::new(RunRegistry::new()),
            executor,
            ingest_seq: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Admit a raw event: classify, resolve its group, cancel superseded
    /// runs and append the new one as a single atomic step, then dispatch.
    ///
    /// Safe to call concurrently from many delivery tasks; only
    /// submissions targeting the same group key serialize against each
    /// other.
    #[instrument(skip(self, raw), fields(event = %raw.event))]
    pub async fn submit(&self, raw: &RawEvent) -> Result<SubmitOutcome, SubmitError> {
        let observed_at = self.ingest_seq.fetch_add(1, Ordering::SeqCst);
        let event = normalizer::normalize(raw, observed_at)?;
        let policy = self.config.policy_for(event.class);
        let key = resolver::resolve(&event, &self.config.workflow, policy.discriminant)?;
        let protected = event.is_protected() || policy.protected;

        let (admitted, canceled) = self
            .registry
            .admit(
                &key,
                &event,
                protected,
                |existing| arbiter::decide(&event, &policy, existing),
                self.config.registry_retry_attempts,
            )
            .await?;

        info!(
            run_id = %admitted.id,
            group = %key,
            class = %event.class,
            canceled = canceled.len(),
            "run admitted"
        );

        for run in &canceled {
            self.executor.cancel(run).await;
            self.schedule_eviction(run.id);
        }
        self.executor.start(&admitted).await;
        self.spawn_dispatch_watchdog(admitted.id);

        Ok(SubmitOutcome { admitted, canceled })
    }

    /// Executor acknowledgment that a run was picked up.
    pub async fn mark_running(&self, id: RunId) -> Result<TransitionOutcome, RegistryError> {
        self.registry.transition(id, RunState::Running).await
    }

    /// Completion callback from the external executor.
    ///
    /// Duplicate callbacks yield `AlreadyTerminal` and change nothing.
    pub async fn complete(
        &self,
        id: RunId,
        outcome: RunOutcome,
    ) -> Result<TransitionOutcome, RegistryError> {
        let state = match outcome {
            RunOutcome::Success => RunState::Completed,
            RunOutcome::Failure => RunState::Failed {
                reason: FailureReason::ExecutorReported,
            },
        };
        let result = self.registry.transition(id, state).await?;
        if result == TransitionOutcome::Applied {
            self.schedule_eviction(id);
        }
        Ok(result)
    }

    /// Fail the run if it is still Queued past the dispatch timeout.
    fn spawn_dispatch_watchdog(&self, id: RunId) {
        let registry = Arc::clone(&self.registry);
        let timeout = self.config.dispatch_timeout();
        let grace = self.config.eviction_grace();

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let failed = RunState::Failed {
                reason: FailureReason::DispatchTimeout,
            };
            match registry.fail_if_queued(id, failed).await {
                Ok(TransitionOutcome::Applied) => {
                    warn!(run_id = %id, "no executor acknowledgment, run failed on dispatch timeout");
                    tokio::time::sleep(grace).await;
                    registry.evict(id).await;
                }
                // Acknowledged, finished, or already evicted: nothing to do.
                Ok(_) | Err(RegistryError::UnknownRun(_)) => {}
                Err(err) => warn!(run_id = %id, %err, "dispatch watchdog transition failed"),
            }
        });
    }

    /// Remove a terminal record once the observability grace period ends.
    fn schedule_eviction(&self, id: RunId) {
        let registry = Arc::clone(&self.registry);
        let grace = self.config.eviction_grace();

        tokio::spawn(async move {
            if !grace.is_zero() {
                tokio::time::sleep(grace).await;
            }
            registry.evict(id).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LoggingExecutor;
    use serde_json::json;

    fn scheduler() -> Scheduler {
        Scheduler::new(CoordinatorConfig::default(), Arc::new(LoggingExecutor))
    }

    fn push(branch: &str, sha: &str) -> RawEvent {
        RawEvent {
            event: "push".to_string(),
            action: None,
            payload: json!({
                "ref": format!("refs/heads/{branch}"),
                "after": sha,
            }),
        }
    }

    #[tokio::test]
    async fn test_submit_admits_queued_run() {
        let scheduler = scheduler();
        let outcome = scheduler.submit(&push("main", "abc123")).await.unwrap();

        assert_eq!(outcome.admitted.state, RunState::Queued);
        assert!(outcome.canceled.is_empty());
        assert_eq!(outcome.admitted.group_key.discriminant, "abc123");
    }

    #[tokio::test]
    async fn test_submit_rejects_malformed_payload() {
        let scheduler = scheduler();
        let raw = RawEvent {
            event: "push".to_string(),
            action: None,
            payload: json!({}),
        };
        let err = scheduler.submit(&raw).await.unwrap_err();
        assert!(matches!(err, SubmitError::Normalize(_)));
    }

    #[tokio::test]
    async fn test_pushes_never_collapse_under_default_policy() {
        let scheduler = scheduler();
        let a = scheduler.submit(&push("main", "aaa")).await.unwrap();
        let b = scheduler.submit(&push("main", "bbb")).await.unwrap();

        // Distinct commits, distinct groups: nothing canceled.
        assert!(b.canceled.is_empty());
        assert_ne!(a.admitted.group_key, b.admitted.group_key);
    }

    #[tokio::test]
    async fn test_observed_at_increases_per_submission() {
        let scheduler = scheduler();
        let a = scheduler.submit(&push("main", "aaa")).await.unwrap();
        let b = scheduler.submit(&push("main", "bbb")).await.unwrap();
        assert!(b.admitted.source.observed_at > a.admitted.source.observed_at);
    }

    #[tokio::test]
    async fn test_completion_callbacks_are_idempotent() {
        let scheduler = scheduler();
        let outcome = scheduler.submit(&push("main", "aaa")).await.unwrap();
        let id = outcome.admitted.id;

        scheduler.mark_running(id).await.unwrap();
        let first = scheduler.complete(id, RunOutcome::Success).await.unwrap();
        let second = scheduler.complete(id, RunOutcome::Success).await.unwrap();

        assert_eq!(first, TransitionOutcome::Applied);
        assert_eq!(second, TransitionOutcome::AlreadyTerminal);
    }
}
