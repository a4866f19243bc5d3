//! Core coordination logic.
//!
//! This module contains:
//! - Normalizer: raw provider payloads to canonical trigger events
//! - Resolver: concurrency-group key derivation per policy
//! - Registry: per-group run state, the only shared mutable state
//! - Arbiter: cancellation decisions, including protected-run immunity
//! - Scheduler: the submit/complete surface wiring it all together

pub mod arbiter;
pub mod normalizer;
pub mod registry;
pub mod resolver;
pub mod scheduler;

// Re-export commonly used types
pub use arbiter::{decide, Decision};
pub use normalizer::{normalize, NormalizeError};
pub use registry::{RegistryError, RunRegistry, TransitionOutcome};
pub use resolver::{resolve, DiscriminantField, ResolveError};
pub use scheduler::{Scheduler, SubmitError, SubmitOutcome};
