//! Domain types for the trigger coordinator.
//!
//! This module contains the core data structures:
//! - Events: canonical trigger records and group keys
//! - Run: execution attempts and their state machine

pub mod event;
pub mod run;

// Re-export commonly used types
pub use event::{EventClass, GroupKey, RawEvent, TriggerEvent};
pub use run::{FailureReason, RunId, RunOutcome, RunRecord, RunState};
