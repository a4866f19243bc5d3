//! gantry - CI trigger-coordination engine
//!
//! Ingests a stream of heterogeneous repository events, classifies them,
//! assigns each to a concurrency group, and decides which in-flight or
//! queued runs must be canceled, retained, or started.
//!
//! # Architecture
//!
//! Data flows one direction: raw event → normalizer → trigger event →
//! group-key resolver → scheduler → arbiter consults and updates the run
//! registry → start/cancel decisions emitted to the external executor.
//!
//! Two ordering domains are deliberately kept apart. `observed_at` is the
//! upstream delivery order and is untrusted: events for the same pull
//! request can arrive out of their logical sequence. `created_at` is the
//! coordinator's own admission counter, assigned under the group lock,
//! and is the only order cancellation decisions use.
//!
//! # Modules
//!
//! - `adapters`: external system integrations (executor seam)
//! - `core`: coordination logic (normalizer, resolver, registry, arbiter,
//!   scheduler)
//! - `domain`: data structures (TriggerEvent, RunRecord, GroupKey)
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Replay a recorded event stream
//! gantry replay events.jsonl
//!
//! # Inspect the effective policy table
//! gantry policy
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{Executor, LoggingExecutor};
pub use config::{ClassPolicy, CoordinatorConfig};
pub use core::{Scheduler, SubmitError, SubmitOutcome};
pub use domain::{
    EventClass, FailureReason, GroupKey, RawEvent, RunId, RunOutcome, RunRecord, RunState,
    TriggerEvent,
};
