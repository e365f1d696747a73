//! graph::errors
//!
//! Typed errors for version-graph operations.
//!
//! Every domain error carries the identifiers (component, hash, tag)
//! needed to render a human-readable message at the boundary. Object
//! store IO errors pass through unchanged; the graph core never retries
//! them. The one recognized escalation - "import from remote, then retry
//! once" around [`GraphError::ParentNotFound`] - is the caller's
//! responsibility, not this crate's.

use thiserror::Error;

use crate::core::types::{ComponentKey, ContentRef, TypeError};
use crate::store::StoreError;

/// Errors from version-graph operations.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The requested head has no snapshot in the store.
    #[error("missing the head {head} of {component}")]
    HeadNotFound {
        component: ComponentKey,
        head: ContentRef,
    },

    /// A snapshot references a parent that cannot be loaded.
    ///
    /// Callers may import missing history from the remote and retry the
    /// operation once.
    #[error("component {component}: snapshot {child} references a missing parent {missing}")]
    ParentNotFound {
        component: ComponentKey,
        child: ContentRef,
        missing: ContentRef,
    },

    /// A tag or version is not part of the component's tag map.
    #[error("version \"{version}\" of \"{component}\" was not found")]
    VersionNotFound {
        component: ComponentKey,
        version: String,
    },

    /// A known version's snapshot object is absent from storage.
    #[error("version \"{version}\" of \"{component}\" exists in the model but its object is missing from storage")]
    VersionNotFoundOnFs {
        component: ComponentKey,
        version: String,
    },

    /// The component has neither a head nor any tagged version.
    #[error("component {component} has no head and no versions")]
    NoHeadNoVersion { component: ComponentKey },

    /// The exact version requested for tagging already exists.
    #[error("version {version} already exists for component {component}")]
    VersionAlreadyExists {
        component: ComponentKey,
        version: String,
    },

    /// A structural invariant failed before persistence.
    ///
    /// Always fatal for the write; never silently repaired.
    #[error("unable to save component \"{component}\": {reason}")]
    Validation {
        component: ComponentKey,
        reason: String,
    },

    /// Insertion on main from a non-head ancestor, without an escape hatch.
    #[error(
        "unable to add a new version for \"{component}\" on main.
this version started from an older version ({previously_used}), and not from the head ({head}).
if this is done intentionally, re-run with detach_head (or override_head if available).
otherwise, check out the head first, then snap/tag your changes"
    )]
    DivergedOnMain {
        component: ComponentKey,
        head: ContentRef,
        previously_used: String,
    },

    /// `detach_head` and `override_head` are mutually exclusive.
    #[error("insert_version expects either detach_head or override_head, not both")]
    DetachAndOverride,

    /// Tagging is only possible on the default lane.
    #[error("unable to tag when checked out to a lane, switch to main, merge the lane and then tag again")]
    TagOnLane,

    /// A lane insertion supplied no previously-used version although a
    /// head exists.
    #[error("component {component} has a head ({head}) but previously_used_version is empty")]
    MissingPreviousVersion {
        component: ComponentKey,
        head: ContentRef,
    },

    /// A serialized graph record could not be parsed.
    #[error("unable to parse version graph record: {0}")]
    Parse(String),

    /// Object store failure, propagated as-is.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Type validation failure.
    #[error(transparent)]
    Type(#[from] TypeError),
}

impl GraphError {
    /// Whether this error means an object is missing from local storage,
    /// so a remote import could repair it.
    pub fn is_missing_object(&self) -> bool {
        matches!(
            self,
            GraphError::HeadNotFound { .. }
                | GraphError::ParentNotFound { .. }
                | GraphError::VersionNotFoundOnFs { .. }
                | GraphError::Store(StoreError::MissingObjectFile { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ComponentKey {
        ComponentKey::new("acme", "button").unwrap()
    }

    #[test]
    fn diverged_error_names_both_remedies() {
        let err = GraphError::DivergedOnMain {
            component: key(),
            head: ContentRef::from_content(b"head"),
            previously_used: "0.0.1".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("detach_head"));
        assert!(msg.contains("override_head"));
        assert!(msg.contains("0.0.1"));
    }

    #[test]
    fn parent_not_found_carries_both_hashes() {
        let child = ContentRef::from_content(b"child");
        let missing = ContentRef::from_content(b"missing");
        let err = GraphError::ParentNotFound {
            component: key(),
            child: child.clone(),
            missing: missing.clone(),
        };
        let msg = err.to_string();
        assert!(msg.contains(child.as_str()));
        assert!(msg.contains(missing.as_str()));
        assert!(err.is_missing_object());
    }

    #[test]
    fn validation_is_not_missing_object() {
        let err = GraphError::Validation {
            component: key(),
            reason: "the \"head\" prop is missing".into(),
        };
        assert!(!err.is_missing_object());
    }
}
