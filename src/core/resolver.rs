//! Group key resolution: which concurrency group an event competes in.
//!
//! Policy picks, per event class, which event field becomes the group
//! discriminant. Discriminants from different selector families are kept
//! provably distinct by embedding `:` in every synthetic composite, a
//! character that is illegal in git ref names and absent from hex shas.
//! A push on a synthetic queue branch can therefore never land in (and
//! cancel) the merge-queue group whose ref it superficially resembles.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{EventClass, GroupKey, TriggerEvent};

/// Which event field becomes the group discriminant for a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscriminantField {
    /// The class-specific commit sha; every distinct commit gets its own
    /// group, so pushes never collapse into each other
    CommitSha,

    /// The PR source branch; successive pushes to one PR branch share a
    /// group and supersede earlier attempts
    HeadRef,

    /// The symbolic ref the event applies to
    RefName,

    /// The pull request number, rendered as `pr:<n>`
    PullRequestNumber,

    /// The provider compare URL (push events)
    CompareUrl,

    /// Merge-queue composite `merge-queue:<target>:<n>`. Distinct from
    /// every other selector's value space by construction.
    MergeQueue,
}

/// Errors produced while resolving a group key.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Policy names a field the event's class does not carry.
    #[error("unresolvable discriminant: {class} event has no usable {field:?}")]
    UnresolvableDiscriminant {
        class: EventClass,
        field: DiscriminantField,
    },
}

/// Derive the concurrency-group key for an event under the given
/// workflow identity and discriminant selector.
pub fn resolve(
    event: &TriggerEvent,
    workflow: &str,
    field: DiscriminantField,
) -> Result<GroupKey, ResolveError> {
    let unresolvable = || ResolveError::UnresolvableDiscriminant {
        class: event.class,
        field,
    };

    let discriminant = match field {
        DiscriminantField::CommitSha => event.commit_sha.clone().ok_or_else(unresolvable)?,
        DiscriminantField::HeadRef => event.head_ref.clone().ok_or_else(unresolvable)?,
        DiscriminantField::RefName => {
            if event.ref_name.is_empty() {
                return Err(unresolvable());
            }
            event.ref_name.clone()
        }
        DiscriminantField::PullRequestNumber => {
            let n = event.pull_request_number.ok_or_else(unresolvable)?;
            format!("pr:{}", n)
        }
        DiscriminantField::CompareUrl => event.compare_url.clone().ok_or_else(unresolvable)?,
        DiscriminantField::MergeQueue => {
            let n = event.pull_request_number.ok_or_else(unresolvable)?;
            let target = event.base_ref.as_deref().ok_or_else(unresolvable)?;
            format!("merge-queue:{}:{}", target, n)
        }
    };

    Ok(GroupKey::new(workflow, discriminant))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(class: EventClass) -> TriggerEvent {
        TriggerEvent {
            class,
            ref_name: "feature".to_string(),
            commit_sha: Some("c".repeat(40)),
            head_sha: None,
            pull_request_number: Some(7),
            head_ref: Some("feature".to_string()),
            base_ref: Some("main".to_string()),
            compare_url: None,
            observed_at: 0,
        }
    }

    #[test]
    fn test_commit_sha_discriminant() {
        let key = resolve(&event(EventClass::Push), "ci", DiscriminantField::CommitSha).unwrap();
        assert_eq!(key, GroupKey::new("ci", "c".repeat(40)));
    }

    #[test]
    fn test_head_ref_discriminant_collapses_pr_pushes() {
        let a = resolve(
            &event(EventClass::PullRequestOpened),
            "ci",
            DiscriminantField::HeadRef,
        )
        .unwrap();
        let b = resolve(
            &event(EventClass::PullRequestSynchronize),
            "ci",
            DiscriminantField::HeadRef,
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_merge_queue_discriminant_distinct_from_ref_names() {
        // A push on the synthetic queue branch resolves by ref or sha; the
        // merge-queue group uses a colon composite no git ref can equal.
        let mut mq = event(EventClass::MergeGroupChecksRequested);
        mq.ref_name = "gh-readonly-queue/main/pr-7-0a1b2c3d".to_string();
        mq.head_ref = None;

        let mq_key = resolve(&mq, "ci", DiscriminantField::MergeQueue).unwrap();
        assert_eq!(mq_key.discriminant, "merge-queue:main:7");

        let mut push = event(EventClass::Push);
        push.ref_name = mq.ref_name.clone();
        let push_by_ref = resolve(&push, "ci", DiscriminantField::RefName).unwrap();
        let push_by_sha = resolve(&push, "ci", DiscriminantField::CommitSha).unwrap();

        assert_ne!(mq_key, push_by_ref);
        assert_ne!(mq_key, push_by_sha);
    }

    #[test]
    fn test_pr_number_discriminant_prefixed() {
        let key = resolve(
            &event(EventClass::PullRequestEnqueued),
            "ci",
            DiscriminantField::PullRequestNumber,
        )
        .unwrap();
        // Prefixed so a branch literally named "7" cannot collide
        assert_eq!(key.discriminant, "pr:7");
    }

    #[test]
    fn test_missing_field_is_unresolvable() {
        let mut push = event(EventClass::Push);
        push.head_ref = None;
        push.pull_request_number = None;

        let err = resolve(&push, "ci", DiscriminantField::HeadRef).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::UnresolvableDiscriminant {
                field: DiscriminantField::HeadRef,
                ..
            }
        ));

        assert!(resolve(&push, "ci", DiscriminantField::PullRequestNumber).is_err());
    }

    #[test]
    fn test_empty_ref_name_is_unresolvable() {
        let mut e = event(EventClass::ManualDispatch);
        e.ref_name = String::new();
        assert!(resolve(&e, "ci", DiscriminantField::RefName).is_err());
    }
}
