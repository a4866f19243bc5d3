//! Trigger events and concurrency-group keys.
//!
//! A `TriggerEvent` is the canonical, immutable record of one externally
//! observed repository happening. The set of event classes is closed and
//! known up front, so classes are a plain enum rather than open dispatch.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed set of repository event classes the coordinator understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventClass {
    Push,
    PullRequestOpened,
    PullRequestSynchronize,
    PullRequestEdited,
    PullRequestEnqueued,
    PullRequestDequeued,
    PullRequestClosed,
    PullRequestTargetOpened,
    PullRequestTargetSynchronize,
    PullRequestTargetEdited,
    PullRequestTargetClosed,
    MergeGroupChecksRequested,
    BranchCreated,
    BranchDeleted,
    IssueOpened,
    ManualDispatch,
}

impl EventClass {
    /// Map a provider event name plus activity type to a class.
    ///
    /// Returns `None` for pairs the coordinator does not handle.
    pub fn from_provider(event: &str, action: Option<&str>) -> Option<Self> {
        match (event, action) {
            ("push", _) => Some(Self::Push),
            ("pull_request", Some("opened")) => Some(Self::PullRequestOpened),
            ("pull_request", Some("synchronize")) => Some(Self::PullRequestSynchronize),
            ("pull_request", Some("edited")) => Some(Self::PullRequestEdited),
            ("pull_request", Some("enqueued")) => Some(Self::PullRequestEnqueued),
            ("pull_request", Some("dequeued")) => Some(Self::PullRequestDequeued),
            ("pull_request", Some("closed")) => Some(Self::PullRequestClosed),
            ("pull_request_target", Some("opened")) => Some(Self::PullRequestTargetOpened),
            ("pull_request_target", Some("synchronize")) => {
                Some(Self::PullRequestTargetSynchronize)
            }
            ("pull_request_target", Some("edited")) => Some(Self::PullRequestTargetEdited),
            ("pull_request_target", Some("closed")) => Some(Self::PullRequestTargetClosed),
            ("merge_group", Some("checks_requested")) => Some(Self::MergeGroupChecksRequested),
            ("create", _) => Some(Self::BranchCreated),
            ("delete", _) => Some(Self::BranchDeleted),
            ("issues", Some("opened")) => Some(Self::IssueOpened),
            ("workflow_dispatch", _) => Some(Self::ManualDispatch),
            _ => None,
        }
    }

    /// Whether runs created from this class are immune to cancellation by
    /// unprotected events. Canceling a merge-queue check evicts the merge
    /// from its queue, so this is hardcoded rather than read from policy.
    pub fn is_protected(&self) -> bool {
        matches!(self, Self::MergeGroupChecksRequested)
    }

    /// The snake_case name of this class, matching the serde
    /// representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::PullRequestOpened => "pull_request_opened",
            Self::PullRequestSynchronize => "pull_request_synchronize",
            Self::PullRequestEdited => "pull_request_edited",
            Self::PullRequestEnqueued => "pull_request_enqueued",
            Self::PullRequestDequeued => "pull_request_dequeued",
            Self::PullRequestClosed => "pull_request_closed",
            Self::PullRequestTargetOpened => "pull_request_target_opened",
            Self::PullRequestTargetSynchronize => "pull_request_target_synchronize",
            Self::PullRequestTargetEdited => "pull_request_target_edited",
            Self::PullRequestTargetClosed => "pull_request_target_closed",
            Self::MergeGroupChecksRequested => "merge_group_checks_requested",
            Self::BranchCreated => "branch_created",
            Self::BranchDeleted => "branch_deleted",
            Self::IssueOpened => "issue_opened",
            Self::ManualDispatch => "manual_dispatch",
        }
    }

    /// Whether this class belongs to the pull-request family
    /// (including `pull_request_target` variants).
    pub fn is_pull_request_family(&self) -> bool {
        matches!(
            self,
            Self::PullRequestOpened
                | Self::PullRequestSynchronize
                | Self::PullRequestEdited
                | Self::PullRequestEnqueued
                | Self::PullRequestDequeued
                | Self::PullRequestClosed
                | Self::PullRequestTargetOpened
                | Self::PullRequestTargetSynchronize
                | Self::PullRequestTargetEdited
                | Self::PullRequestTargetClosed
        )
    }
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw, provider-shaped event as delivered by the (external) transport:
/// the declared event name, its activity type, and the untyped payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    /// Provider event name, e.g. "push" or "pull_request"
    pub event: String,

    /// Activity type, e.g. "opened" or "synchronize"
    #[serde(default)]
    pub action: Option<String>,

    /// Full provider payload
    pub payload: serde_json::Value,
}

/// Canonical record of one observed repository event.
///
/// `observed_at` is the arrival order as seen by the coordinator. It is
/// *not* a causal order: events for the same pull request can be delivered
/// out of their logical sequence, so no coordination decision may depend
/// on it. Tie-breaks use the coordinator-assigned admission counter on the
/// run record instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Classified event variant
    pub class: EventClass,

    /// Symbolic ref the event applies to (branch or synthetic queue branch)
    pub ref_name: String,

    /// The git object the event's checks should validate.
    ///
    /// Semantics vary by class: the pushed commit for pushes, the ephemeral
    /// proposed-merge commit for pull requests, the current base-branch
    /// commit for `pull_request_target`, and the temporary queue commit for
    /// merge-group events. `None` for classes without a meaningful commit.
    pub commit_sha: Option<String>,

    /// The actual branch head for pull-request events (the payload's
    /// secondary `after` field), distinct from the proposed-merge commit
    pub head_sha: Option<String>,

    /// Pull request number; present for PR-family and merge-queue classes
    pub pull_request_number: Option<u64>,

    /// Source branch of a pull request
    pub head_ref: Option<String>,

    /// Target branch of a pull request
    pub base_ref: Option<String>,

    /// Provider compare URL (push events)
    pub compare_url: Option<String>,

    /// Arrival sequence number; untrusted ordering, see type docs
    pub observed_at: u64,
}

impl TriggerEvent {
    /// Whether this event's runs are immune to cancellation by
    /// unprotected events.
    pub fn is_protected(&self) -> bool {
        self.class.is_protected()
    }
}

/// Identifies one concurrency group: runs sharing a key compete, with
/// newer admissions typically superseding older ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    /// The workflow identity this group belongs to
    pub workflow: String,

    /// Policy-chosen discriminant value (branch, sha, PR number, ...)
    pub discriminant: String,
}

impl GroupKey {
    pub fn new(workflow: impl Into<String>, discriminant: impl Into<String>) -> Self {
        Self {
            workflow: workflow.into(),
            discriminant: discriminant.into(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.workflow, self.discriminant)
    }
}
