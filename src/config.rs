//! Coordinator configuration and per-class cancellation policy.
//!
//! Configuration sources (highest priority first):
//! 1. `GANTRY_CONFIG` environment variable (explicit file path)
//! 2. Config file (.gantry/config.yaml, searched upward from the cwd)
//! 3. Built-in defaults
//!
//! The built-in policy table reproduces the known-correct setup: pushes
//! keyed by commit (never collapsed), PR-family events keyed by head
//! branch (successive pushes supersede), queue membership events keyed by
//! PR number, and merge-queue checks keyed by a composite that cannot
//! collide with any branch or sha.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::resolver::DiscriminantField;
use crate::domain::EventClass;

/// Cancellation policy for one event class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassPolicy {
    /// Which event field becomes the group discriminant
    pub discriminant: DiscriminantField,

    /// Whether a newer run may cancel a Running (not just Queued) one
    #[serde(default)]
    pub cancel_in_progress: bool,

    /// Additional protection for this class. Additive only: merge-queue
    /// checks stay protected no matter what this says.
    #[serde(default)]
    pub protected: bool,

    /// Whether a protected event may cancel unprotected runs in the same
    /// group. Off by default: no cancellation across the boundary in
    /// either direction.
    #[serde(default)]
    pub protected_supersedes: bool,
}

/// Full coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Workflow identity; the first half of every group key
    #[serde(default = "default_workflow")]
    pub workflow: String,

    /// How long a Queued run may wait for executor acknowledgment before
    /// it is failed with a dispatch timeout
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_seconds: u64,

    /// How long terminal records stay in the registry for observability
    #[serde(default = "default_eviction_grace")]
    pub eviction_grace_seconds: u64,

    /// Bounded internal retries when a registry slot is contended
    #[serde(default = "default_retry_attempts")]
    pub registry_retry_attempts: u32,

    /// Per-class policy overrides; classes not listed use the defaults
    #[serde(default)]
    pub classes: HashMap<EventClass, ClassPolicy>,
}

fn default_workflow() -> String {
    "ci".to_string()
}
fn default_dispatch_timeout() -> u64 {
    60
}
fn default_eviction_grace() -> u64 {
    300
}
fn default_retry_attempts() -> u32 {
    3
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            workflow: default_workflow(),
            dispatch_timeout_seconds: default_dispatch_timeout(),
            eviction_grace_seconds: default_eviction_grace(),
            registry_retry_attempts: default_retry_attempts(),
            classes: HashMap::new(),
        }
    }
}

impl CoordinatorConfig {
    /// Effective policy for a class: explicit override, else built-in.
    pub fn policy_for(&self, class: EventClass) -> ClassPolicy {
        self.classes
            .get(&class)
            .cloned()
            .unwrap_or_else(|| default_policy(class))
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_seconds)
    }

    pub fn eviction_grace(&self) -> Duration {
        Duration::from_secs(self.eviction_grace_seconds)
    }

    /// Load configuration from all sources.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("GANTRY_CONFIG") {
            return Self::from_file(Path::new(&path));
        }
        if let Some(path) = find_config_file() {
            return Self::from_file(&path);
        }
        Ok(Self::default())
    }

    /// Load and parse a specific config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Built-in policy for a class (the known-correct setup).
pub fn default_policy(class: EventClass) -> ClassPolicy {
    let (discriminant, cancel_in_progress) = match class {
        // Every push validates its own commit; nothing collapses.
        EventClass::Push => (DiscriminantField::CommitSha, false),

        // Queue membership tracks the PR, not the branch.
        EventClass::PullRequestEnqueued | EventClass::PullRequestDequeued => {
            (DiscriminantField::PullRequestNumber, true)
        }

        c if c.is_pull_request_family() => (DiscriminantField::HeadRef, true),

        // The composite keeps queue checks out of every push/PR group.
        EventClass::MergeGroupChecksRequested => (DiscriminantField::MergeQueue, true),

        _ => (DiscriminantField::RefName, false),
    };

    ClassPolicy {
        discriminant,
        cancel_in_progress,
        protected: false,
        protected_supersedes: false,
    }
}

/// Find a config file by searching the current directory and parents.
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".gantry").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}
