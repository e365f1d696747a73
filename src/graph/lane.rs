//! graph::lane
//!
//! Lanes: named, independently-advancing pointers to per-component
//! heads, optionally forked from another lane.
//!
//! # Branch context
//!
//! The per-session branch state of a graph is a single tagged union,
//! [`BranchContext`], computed once by
//! [`VersionGraph::populate_heads`](crate::graph::component::VersionGraph::populate_heads)
//! and carried explicitly. The remote head calculated for a lane keeps a
//! confidence flag: falling back to the component's own head when no
//! remote information exists at all is an optimistic assumption, not a
//! confirmation, and callers can observe the difference.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::types::{ComponentKey, ContentRef, LaneRef};

/// A named branch pointer holding per-component heads.
///
/// # Example
///
/// ```
/// use strata::graph::lane::Lane;
/// use strata::core::types::{ComponentKey, ContentRef, LaneRef};
///
/// let id = LaneRef::new("acme", "lane-a").unwrap();
/// let mut lane = Lane::new(id);
/// assert!(lane.is_new());
///
/// let key = ComponentKey::new("acme", "button").unwrap();
/// let head = ContentRef::from_content(b"snap");
/// lane.set_component_head(key.clone(), head.clone());
/// assert_eq!(lane.component_head(&key), Some(&head));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lane {
    /// Lane identity.
    pub id: LaneRef,
    /// Whether the lane was created locally and never exported.
    pub is_new: bool,
    /// The lane this one was forked from, if any.
    pub forked_from: Option<LaneRef>,
    /// Per-component heads on this lane.
    heads: BTreeMap<ComponentKey, ContentRef>,
}

impl Lane {
    /// Create a new (unexported) lane.
    pub fn new(id: LaneRef) -> Self {
        Self {
            id,
            is_new: true,
            forked_from: None,
            heads: BTreeMap::new(),
        }
    }

    /// Create a lane forked from another lane.
    pub fn forked(id: LaneRef, forked_from: LaneRef) -> Self {
        Self {
            id,
            is_new: true,
            forked_from: Some(forked_from),
            heads: BTreeMap::new(),
        }
    }

    /// Mark the lane as exported (known to the remote).
    pub fn mark_exported(&mut self) {
        self.is_new = false;
    }

    /// Whether the lane was never exported.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// The head of a component on this lane, if tracked here.
    pub fn component_head(&self, component: &ComponentKey) -> Option<&ContentRef> {
        self.heads.get(component)
    }

    /// Record (or advance) a component's head on this lane.
    pub fn set_component_head(&mut self, component: ComponentKey, head: ContentRef) {
        self.heads.insert(component, head);
    }

    /// Components tracked on this lane.
    pub fn components(&self) -> impl Iterator<Item = (&ComponentKey, &ContentRef)> {
        self.heads.iter()
    }
}

/// How a calculated remote head was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteConfidence {
    /// Derived from recorded remote state (this lane, its fork origin,
    /// or the default lane).
    Confirmed,
    /// No remote information existed; assumed equal to the local head.
    AssumedLocal,
}

/// A calculated remote head plus how much to trust it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHeadGuess {
    /// The calculated head.
    pub head: ContentRef,
    /// Whether the head reflects real remote knowledge.
    pub confidence: RemoteConfidence,
}

impl RemoteHeadGuess {
    /// Whether this guess reflects confirmed remote state.
    pub fn is_confirmed(&self) -> bool {
        self.confidence == RemoteConfidence::Confirmed
    }
}

/// Per-session branch state of one component graph.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BranchContext {
    /// Heads were not populated this session.
    #[default]
    Unknown,
    /// On the default lane.
    Main {
        /// Remote head on the default lane, if recorded.
        remote_head: Option<ContentRef>,
    },
    /// Checked out to a named lane.
    OnLane {
        /// Which lane.
        lane: LaneRef,
        /// The component's head on the lane, if it was ever snapped there.
        local: Option<ContentRef>,
        /// The recorded remote head on this exact lane, if any.
        remote: Option<ContentRef>,
        /// Remote head on the default lane, if recorded.
        main_remote: Option<ContentRef>,
        /// Fallback-resolved remote head used for merge-base math.
        calculated_remote: Option<RemoteHeadGuess>,
    },
}

impl BranchContext {
    /// Whether the graph is checked out to a named lane.
    pub fn is_on_lane(&self) -> bool {
        matches!(self, BranchContext::OnLane { .. })
    }

    /// The lane-local head, when on a lane.
    pub fn lane_local_head(&self) -> Option<&ContentRef> {
        match self {
            BranchContext::OnLane { local, .. } => local.as_ref(),
            _ => None,
        }
    }

    /// The recorded remote head for the current checkout: lane head when
    /// on a lane, default-lane head otherwise.
    pub fn recorded_remote_head(&self) -> Option<&ContentRef> {
        match self {
            BranchContext::Unknown => None,
            BranchContext::Main { remote_head } => remote_head.as_ref(),
            BranchContext::OnLane { remote, .. } => remote.as_ref(),
        }
    }

    /// The remote head on the default lane, regardless of checkout.
    pub fn main_remote_head(&self) -> Option<&ContentRef> {
        match self {
            BranchContext::Unknown => None,
            BranchContext::Main { remote_head } => remote_head.as_ref(),
            BranchContext::OnLane { main_remote, .. } => main_remote.as_ref(),
        }
    }

    /// The calculated remote head used for divergence, when on a lane.
    pub fn calculated_remote(&self) -> Option<&RemoteHeadGuess> {
        match self {
            BranchContext::OnLane {
                calculated_remote, ..
            } => calculated_remote.as_ref(),
            _ => None,
        }
    }
}
