//! External system integrations.

pub mod executor;

pub use executor::{Executor, LoggingExecutor};
