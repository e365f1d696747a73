//! graph::divergence
//!
//! Merge-base computation: which snaps exist only on one side of two
//! heads, and the common ancestor they diverged from.
//!
//! # Algorithm
//!
//! Both heads are walked newest-first over the ancestry index (breadth
//! first, with a visited set, so long histories never recurse). A snap
//! is "source only" if it is reachable from the source head but not
//! from the target head; symmetric for target. The common snap before
//! divergence is the first source-side snap that is also reachable from
//! the target. A `None` head contributes nothing, so the whole other
//! side counts as ahead.

use std::collections::{HashSet, VecDeque};

use crate::core::types::ContentRef;
use crate::graph::errors::GraphError;
use crate::graph::history::AncestryIndex;

/// The distance between two heads.
///
/// Only-lists are held newest-first; use the `oldest_first` accessors
/// when presenting or exporting.
#[derive(Debug, Default)]
pub struct SnapsDistance {
    snaps_on_source_only: Vec<ContentRef>,
    snaps_on_target_only: Vec<ContentRef>,
    common_snap_before_diverge: Option<ContentRef>,
    err: Option<GraphError>,
}

impl SnapsDistance {
    /// A distance that could not be computed.
    ///
    /// Both only-lists are empty and callers must treat the relation as
    /// unknown, not as "up to date".
    pub fn unknown(err: GraphError) -> Self {
        Self {
            err: Some(err),
            ..Self::default()
        }
    }

    /// Snaps reachable only from the source head, newest-first.
    pub fn snaps_on_source_only(&self) -> &[ContentRef] {
        &self.snaps_on_source_only
    }

    /// Snaps reachable only from the target head, newest-first.
    pub fn snaps_on_target_only(&self) -> &[ContentRef] {
        &self.snaps_on_target_only
    }

    /// Source-only snaps ordered oldest-first (export/status order).
    pub fn source_only_oldest_first(&self) -> Vec<ContentRef> {
        let mut snaps = self.snaps_on_source_only.clone();
        snaps.reverse();
        snaps
    }

    /// Target-only snaps ordered oldest-first.
    pub fn target_only_oldest_first(&self) -> Vec<ContentRef> {
        let mut snaps = self.snaps_on_target_only.clone();
        snaps.reverse();
        snaps
    }

    /// The common ancestor both sides diverged from, if any.
    pub fn common_snap_before_diverge(&self) -> Option<&ContentRef> {
        self.common_snap_before_diverge.as_ref()
    }

    /// The failure that prevented computing the distance, if any.
    pub fn err(&self) -> Option<&GraphError> {
        self.err.as_ref()
    }

    /// Whether the source side has snaps the target lacks.
    pub fn is_source_ahead(&self) -> bool {
        !self.snaps_on_source_only.is_empty()
    }

    /// Whether the target side has snaps the source lacks.
    pub fn is_target_ahead(&self) -> bool {
        !self.snaps_on_target_only.is_empty()
    }

    /// True divergence: both sides ahead, not a fast-forward.
    pub fn is_diverged(&self) -> bool {
        self.is_source_ahead() && self.is_target_ahead()
    }

    /// Neither side ahead and the computation succeeded.
    pub fn is_up_to_date(&self) -> bool {
        self.err.is_none() && !self.is_source_ahead() && !self.is_target_ahead()
    }
}

/// Every ancestor of `head` (inclusive), newest-first.
///
/// # Errors
///
/// [`GraphError::ParentNotFound`] when the walk reaches a hash the
/// index does not cover - the index must be populated for `head` first.
fn ancestors_of(
    index: &AncestryIndex,
    head: &ContentRef,
) -> Result<Vec<ContentRef>, GraphError> {
    let mut ordered = Vec::new();
    let mut seen: HashSet<ContentRef> = HashSet::new();
    // Queue entries carry the child that referenced them, for error
    // reporting on an incomplete index.
    let mut queue: VecDeque<(ContentRef, Option<ContentRef>)> = VecDeque::new();
    queue.push_back((head.clone(), None));
    seen.insert(head.clone());

    while let Some((hash, child)) = queue.pop_front() {
        let parents = match index.parents_of(&hash) {
            Some(parents) => parents,
            None => {
                return Err(match child {
                    Some(child) => GraphError::ParentNotFound {
                        component: index.component().clone(),
                        child,
                        missing: hash,
                    },
                    None => GraphError::HeadNotFound {
                        component: index.component().clone(),
                        head: hash,
                    },
                })
            }
        };
        for parent in parents {
            if seen.insert(parent.clone()) {
                queue.push_back((parent.clone(), Some(hash.clone())));
            }
        }
        ordered.push(hash);
    }
    Ok(ordered)
}

/// Compute the distance between two heads over a populated index.
///
/// Either head may be `None` ("no history on that side"). The index
/// must already cover both heads; [`VersionGraph`] populates it first.
///
/// [`VersionGraph`]: crate::graph::component::VersionGraph
pub fn distance_over_index(
    index: &AncestryIndex,
    source_head: Option<&ContentRef>,
    target_head: Option<&ContentRef>,
) -> Result<SnapsDistance, GraphError> {
    let source_walk = match source_head {
        Some(head) => ancestors_of(index, head)?,
        None => Vec::new(),
    };
    let target_walk = match target_head {
        Some(head) => ancestors_of(index, head)?,
        None => Vec::new(),
    };

    let source_set: HashSet<&ContentRef> = source_walk.iter().collect();
    let target_set: HashSet<&ContentRef> = target_walk.iter().collect();

    let common_snap_before_diverge = if source_head.is_some() && target_head.is_some() {
        source_walk
            .iter()
            .find(|hash| target_set.contains(hash))
            .cloned()
    } else {
        None
    };

    let snaps_on_source_only = source_walk
        .iter()
        .filter(|hash| !target_set.contains(hash))
        .cloned()
        .collect();
    let snaps_on_target_only = target_walk
        .iter()
        .filter(|hash| !source_set.contains(hash))
        .cloned()
        .collect();

    Ok(SnapsDistance {
        snaps_on_source_only,
        snaps_on_target_only,
        common_snap_before_diverge,
        err: None,
    })
}
