//! Event normalization: raw provider payload to canonical `TriggerEvent`.
//!
//! Pure translation, no side effects. The one subtlety worth spelling out
//! is what `commit_sha` means per class:
//! - push: the pushed commit (`after`), never a merge
//! - pull_request: the ephemeral proposed-merge commit; the branch head
//!   is only available from the secondary `after`/`head.sha` fields
//! - pull_request_target: the current base-branch commit, unrelated to
//!   the PR content
//! - merge_group: the temporary queue commit at the head of the synthetic
//!   queue branch

use serde_json::Value;
use thiserror::Error;

use crate::domain::{EventClass, RawEvent, TriggerEvent};

/// Errors produced while normalizing a raw event.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The declared event/action pair maps to no known class.
    #[error("unrecognized event shape: no class for event '{event}' action {action:?}")]
    UnknownEventClass {
        event: String,
        action: Option<String>,
    },

    /// The payload is missing a field the declared class requires.
    #[error("unrecognized event shape: {class} payload missing '{field}'")]
    UnrecognizedEventShape {
        class: EventClass,
        field: &'static str,
    },
}

/// Normalize a raw event into exactly one `TriggerEvent`.
///
/// `observed_at` is the coordinator's arrival sequence number; it is
/// recorded verbatim and never used for ordering decisions.
pub fn normalize(raw: &RawEvent, observed_at: u64) -> Result<TriggerEvent, NormalizeError> {
    let class = EventClass::from_provider(&raw.event, raw.action.as_deref()).ok_or_else(|| {
        NormalizeError::UnknownEventClass {
            event: raw.event.clone(),
            action: raw.action.clone(),
        }
    })?;

    let p = &raw.payload;

    match class {
        EventClass::Push => {
            let ref_name = strip_ref(require_str(p, "/ref", class, "ref")?);
            let commit_sha = require_str(p, "/after", class, "after")?;
            Ok(TriggerEvent {
                class,
                ref_name: ref_name.to_string(),
                commit_sha: Some(commit_sha.to_string()),
                head_sha: None,
                pull_request_number: None,
                head_ref: None,
                base_ref: None,
                compare_url: get_str(p, "/compare").map(str::to_string),
                observed_at,
            })
        }

        c if c.is_pull_request_family() => normalize_pull_request(p, c, observed_at),

        EventClass::MergeGroupChecksRequested => {
            let ref_name = strip_ref(require_str(p, "/merge_group/head_ref", class, "merge_group.head_ref")?);
            let commit_sha = require_str(p, "/merge_group/head_sha", class, "merge_group.head_sha")?;
            // The queue ref embeds the PR number; the payload's base_ref is
            // preferred but older payloads only carry the synthetic ref.
            let base_ref = get_str(p, "/merge_group/base_ref")
                .map(|s| strip_ref(s).to_string())
                .or_else(|| queue_ref_base(ref_name).map(str::to_string));
            let pull_request_number =
                queue_ref_pr_number(ref_name).ok_or(NormalizeError::UnrecognizedEventShape {
                    class,
                    field: "merge_group.head_ref (queue ref with pr number)",
                })?;
            Ok(TriggerEvent {
                class,
                ref_name: ref_name.to_string(),
                commit_sha: Some(commit_sha.to_string()),
                head_sha: None,
                pull_request_number: Some(pull_request_number),
                head_ref: None,
                base_ref,
                compare_url: None,
                observed_at,
            })
        }

        EventClass::BranchCreated | EventClass::BranchDeleted => {
            let ref_name = strip_ref(require_str(p, "/ref", class, "ref")?);
            Ok(TriggerEvent {
                class,
                ref_name: ref_name.to_string(),
                commit_sha: None,
                head_sha: None,
                pull_request_number: None,
                head_ref: None,
                base_ref: None,
                compare_url: None,
                observed_at,
            })
        }

        EventClass::IssueOpened => {
            // Issue-triggered checks run against the default branch.
            let ref_name = get_str(p, "/repository/default_branch").unwrap_or("main");
            Ok(TriggerEvent {
                class,
                ref_name: ref_name.to_string(),
                commit_sha: None,
                head_sha: None,
                pull_request_number: None,
                head_ref: None,
                base_ref: None,
                compare_url: None,
                observed_at,
            })
        }

        EventClass::ManualDispatch => {
            let ref_name = strip_ref(require_str(p, "/ref", class, "ref")?);
            Ok(TriggerEvent {
                class,
                ref_name: ref_name.to_string(),
                commit_sha: None,
                head_sha: None,
                pull_request_number: None,
                head_ref: None,
                base_ref: None,
                compare_url: None,
                observed_at,
            })
        }

        // All remaining classes are covered by the arms above.
        _ => unreachable!("pull-request classes handled by guard arm"),
    }
}

fn normalize_pull_request(
    p: &Value,
    class: EventClass,
    observed_at: u64,
) -> Result<TriggerEvent, NormalizeError> {
    let head_ref = require_str(p, "/pull_request/head/ref", class, "pull_request.head.ref")?;
    let base_ref = require_str(p, "/pull_request/base/ref", class, "pull_request.base.ref")?;
    let number = p
        .pointer("/number")
        .or_else(|| p.pointer("/pull_request/number"))
        .and_then(Value::as_u64)
        .ok_or(NormalizeError::UnrecognizedEventShape {
            class,
            field: "number",
        })?;

    let is_target = matches!(
        class,
        EventClass::PullRequestTargetOpened
            | EventClass::PullRequestTargetSynchronize
            | EventClass::PullRequestTargetEdited
            | EventClass::PullRequestTargetClosed
    );

    // pull_request_target checks out the base branch, so its commit is the
    // current base head. Plain pull_request validates the proposed merge,
    // which may not exist yet on a freshly opened PR.
    let commit_sha = if is_target {
        Some(
            require_str(p, "/pull_request/base/sha", class, "pull_request.base.sha")?.to_string(),
        )
    } else {
        get_str(p, "/pull_request/merge_commit_sha").map(str::to_string)
    };

    let head_sha = p
        .pointer("/after")
        .and_then(Value::as_str)
        .or_else(|| get_str(p, "/pull_request/head/sha"))
        .map(str::to_string);

    Ok(TriggerEvent {
        class,
        ref_name: if is_target { base_ref } else { head_ref }.to_string(),
        commit_sha,
        head_sha,
        pull_request_number: Some(number),
        head_ref: Some(head_ref.to_string()),
        base_ref: Some(base_ref.to_string()),
        compare_url: None,
        observed_at,
    })
}

/// Strip the `refs/heads/` prefix from a fully qualified ref.
fn strip_ref(s: &str) -> &str {
    s.strip_prefix("refs/heads/").unwrap_or(s)
}

fn get_str<'a>(v: &'a Value, pointer: &str) -> Option<&'a str> {
    v.pointer(pointer).and_then(Value::as_str)
}

fn require_str<'a>(
    v: &'a Value,
    pointer: &str,
    class: EventClass,
    field: &'static str,
) -> Result<&'a str, NormalizeError> {
    get_str(v, pointer).ok_or(NormalizeError::UnrecognizedEventShape { class, field })
}

/// Extract the PR number embedded in a synthetic queue ref, e.g.
/// `gh-readonly-queue/main/pr-7-0123abcd...` yields 7.
///
/// Note the trailing hash in the ref is the queue commit's predecessor,
/// not the commit the checks run against; the ref is never a usable
/// discriminant on its own.
pub fn queue_ref_pr_number(ref_name: &str) -> Option<u64> {
    let last = ref_name.rsplit('/').next()?;
    let rest = last.strip_prefix("pr-")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Extract the target branch from a synthetic queue ref.
fn queue_ref_base(ref_name: &str) -> Option<&str> {
    let rest = ref_name.strip_prefix("gh-readonly-queue/")?;
    let idx = rest.rfind('/')?;
    Some(&rest[..idx])
}
