//! Executor adapter: the seam to the external CI runner.
//!
//! The engine only decides and requests; execution happens elsewhere.
//! `start` and `cancel` are fire-and-forget with at-least-once delivery:
//! implementations must enqueue the request and return immediately (never
//! block on runner I/O), and the runner side must treat duplicates as
//! idempotent. Cancellation is advisory; it can race a completion signal,
//! which the registry absorbs as `AlreadyTerminal`.

use async_trait::async_trait;
use tracing::info;

use crate::domain::RunRecord;

/// External executor collaborator.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Request that the executor start this run.
    async fn start(&self, run: &RunRecord);

    /// Request that the executor cancel this run.
    async fn cancel(&self, run: &RunRecord);
}

/// Executor that only logs the requests it receives. Used by the CLI
/// replay harness, where no real runner is attached.
#[derive(Debug, Default)]
pub struct LoggingExecutor;

#[async_trait]
impl Executor for LoggingExecutor {
    async fn start(&self, run: &RunRecord) {
        info!(run_id = %run.id, group = %run.group_key, "start requested");
    }

    async fn cancel(&self, run: &RunRecord) {
        info!(run_id = %run.id, group = %run.group_key, "cancel requested");
    }
}
