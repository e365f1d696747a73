//! graph::history
//!
//! The ancestry index: a persisted, append-only map from each known
//! snapshot hash to its parent hashes, plus the lazy population walk
//! that fills it from the object store.
//!
//! # Architecture
//!
//! The index exists so that ancestry queries (divergence, logs, ancestor
//! lookup) do not require loading full snapshot payloads. It is partial
//! by nature: a hash that is absent means "unknown locally", never
//! "root". Entries are only ever added; parents recorded for a hash are
//! authoritative and never rewritten.
//!
//! # Population
//!
//! [`populate_ancestry`] guarantees that a target head and its full
//! parent chain (down to roots or to already-indexed hashes) are
//! present, loading missing snapshots from the store. The traversal is
//! an explicit worklist, depth-first over parents in their listed order,
//! so discovery order is deterministic. The on-disk record is written
//! once, after the whole traversal succeeds; a failed run leaves the
//! stored index untouched and returns the accumulated edges next to the
//! error so the caller can decide whether to proceed degraded.
//!
//! Callers must serialize population per component; [`VersionGraph`]
//! owns the guard (see `graph::component`).
//!
//! [`VersionGraph`]: crate::graph::component::VersionGraph

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{ComponentKey, ContentRef, TagName};
use crate::graph::errors::GraphError;
use crate::graph::snapshot::VersionSnapshot;
use crate::store::{ObjectItem, ObjectStore, StoreError};

/// Schema discriminator for the persisted index record.
pub const ANCESTRY_INDEX_SCHEMA: &str = "ancestry-index/1";

/// One snapshot's parent edge set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionParents {
    /// The snapshot hash.
    pub hash: ContentRef,
    /// Its parent hashes; empty for a root.
    pub parents: Vec<ContentRef>,
}

impl From<&VersionSnapshot> for VersionParents {
    fn from(snapshot: &VersionSnapshot) -> Self {
        Self {
            hash: snapshot.hash.clone(),
            parents: snapshot.parents.clone(),
        }
    }
}

/// Append-only ancestry index for one component.
///
/// # Example
///
/// ```
/// use strata::graph::history::{AncestryIndex, VersionParents};
/// use strata::core::types::{ComponentKey, ContentRef};
///
/// let key = ComponentKey::new("acme", "button").unwrap();
/// let mut index = AncestryIndex::new(key);
///
/// let root = ContentRef::from_content(b"root");
/// let child = ContentRef::from_content(b"child");
/// index.add(VersionParents { hash: root.clone(), parents: vec![] });
/// index.add(VersionParents { hash: child.clone(), parents: vec![root.clone()] });
///
/// assert_eq!(index.parents_of(&child), Some(&[root][..]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncestryIndex {
    component: ComponentKey,
    entries: BTreeMap<ContentRef, Vec<ContentRef>>,
}

/// Persisted shape of the index.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct AncestryIndexRecord {
    schema: String,
    component: ComponentKey,
    entries: BTreeMap<ContentRef, Vec<ContentRef>>,
}

impl AncestryIndex {
    /// Create an empty index for a component.
    pub fn new(component: ComponentKey) -> Self {
        Self {
            component,
            entries: BTreeMap::new(),
        }
    }

    /// The deterministic store address of a component's index record.
    ///
    /// One record per component identity, independent of its contents.
    pub fn record_address(component: &ComponentKey) -> ContentRef {
        ContentRef::from_content(
            format!("strata.ancestry-index\0{component}").as_bytes(),
        )
    }

    /// The component this index belongs to.
    pub fn component(&self) -> &ComponentKey {
        &self.component
    }

    /// Whether a hash is indexed.
    pub fn contains(&self, hash: &ContentRef) -> bool {
        self.entries.contains_key(hash)
    }

    /// The recorded parents of a hash, if indexed.
    pub fn parents_of(&self, hash: &ContentRef) -> Option<&[ContentRef]> {
        self.entries.get(hash).map(|p| p.as_slice())
    }

    /// Add one edge set. Returns `false` (and changes nothing) if the
    /// hash is already indexed - entries are never overwritten.
    pub fn add(&mut self, edge: VersionParents) -> bool {
        if self.entries.contains_key(&edge.hash) {
            return false;
        }
        self.entries.insert(edge.hash, edge.parents);
        true
    }

    /// Add many edge sets, skipping already-indexed hashes.
    pub fn add_all(&mut self, edges: impl IntoIterator<Item = VersionParents>) {
        for edge in edges {
            self.add(edge);
        }
    }

    /// Number of indexed hashes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is indexed yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All indexed hashes in stable order.
    pub fn hashes(&self) -> impl Iterator<Item = &ContentRef> {
        self.entries.keys()
    }

    /// Walk `generations` first-parent steps back from `from`.
    ///
    /// Returns `None` when the chain ends (root reached or an ancestor
    /// is not indexed) before covering the requested distance.
    pub fn ancestor(&self, from: &ContentRef, generations: usize) -> Option<ContentRef> {
        let mut current = from.clone();
        for _ in 0..generations {
            let parents = self.entries.get(&current)?;
            current = parents.first()?.clone();
        }
        Some(current)
    }

    /// Serialize the index to its store record.
    pub fn to_object_item(&self) -> Result<ObjectItem, StoreError> {
        let address = Self::record_address(&self.component);
        let record = AncestryIndexRecord {
            schema: ANCESTRY_INDEX_SCHEMA.to_string(),
            component: self.component.clone(),
            entries: self.entries.clone(),
        };
        let bytes = serde_json::to_vec(&record).map_err(|e| StoreError::Corrupt {
            reference: address.clone(),
            message: e.to_string(),
        })?;
        Ok(ObjectItem {
            reference: address,
            bytes,
        })
    }

    /// Load the persisted index, or an empty one when no record exists.
    pub async fn load_or_default(
        store: &dyn ObjectStore,
        component: &ComponentKey,
    ) -> Result<Self, StoreError> {
        let address = Self::record_address(component);
        match store.load(&address).await? {
            None => Ok(Self::new(component.clone())),
            Some(item) => {
                let record: AncestryIndexRecord =
                    serde_json::from_slice(&item.bytes).map_err(|e| StoreError::Corrupt {
                        reference: address,
                        message: e.to_string(),
                    })?;
                Ok(Self {
                    component: record.component,
                    entries: record.entries,
                })
            }
        }
    }
}

/// Result of a graceful population run.
///
/// `added` holds the edges the traversal discovered, in discovery order.
/// When `err` is set, those edges were NOT written to the stored index;
/// the caller may still use them in memory to proceed degraded.
#[derive(Debug)]
pub struct PopulateOutcome {
    /// Newly discovered edges (not present in the index beforehand).
    pub added: Vec<VersionParents>,
    /// The failure that aborted the traversal, if any.
    pub err: Option<GraphError>,
}

impl PopulateOutcome {
    fn empty() -> Self {
        Self {
            added: Vec::new(),
            err: None,
        }
    }
}

/// Populate the index so it covers `head` and its full parent chain.
///
/// With `exit_when_found` (the normal mode), an already-indexed hash
/// stops the descent on that branch - the chain below it is complete by
/// construction. Passing `false` forces a full traversal to the roots,
/// used to repair an index after an interrupted write.
///
/// IO errors from the store are returned as `Err`; domain failures
/// (missing head, missing parent) come back inside the outcome together
/// with the accumulated edges. The stored record is updated only when
/// the whole traversal succeeded.
///
/// Callers must hold the owning graph's population guard.
pub(crate) async fn populate_ancestry(
    store: &dyn ObjectStore,
    index: &mut AncestryIndex,
    head: &ContentRef,
    tags: &BTreeMap<TagName, ContentRef>,
    exit_when_found: bool,
) -> Result<PopulateOutcome, GraphError> {
    let component = index.component().clone();
    if exit_when_found && index.contains(head) {
        return Ok(PopulateOutcome::empty());
    }

    let head_snapshot = match store.load(head).await? {
        None => {
            return Ok(PopulateOutcome {
                added: Vec::new(),
                err: Some(GraphError::HeadNotFound {
                    component,
                    head: head.clone(),
                }),
            })
        }
        Some(item) => VersionSnapshot::from_object_item(&item)?,
    };

    let tag_of = |hash: &ContentRef| -> Option<String> {
        tags.iter()
            .find(|(_, r)| *r == hash)
            .map(|(tag, _)| tag.to_string())
    };

    let mut added: Vec<VersionParents> = Vec::new();
    let mut staged: HashSet<ContentRef> = HashSet::new();
    // Hashes already loaded (on the stack or expanded); guards against
    // loading a shared ancestor once per child.
    let mut seen: HashSet<ContentRef> = HashSet::new();
    seen.insert(head_snapshot.hash.clone());
    let mut stack: Vec<VersionSnapshot> = vec![head_snapshot];
    let mut err: Option<GraphError> = None;

    'walk: while let Some(snapshot) = stack.pop() {
        if !index.contains(&snapshot.hash) && staged.insert(snapshot.hash.clone()) {
            added.push(VersionParents::from(&snapshot));
        }
        // Reverse push so the first-listed parent is expanded first.
        for parent in snapshot.parents.iter().rev() {
            if seen.contains(parent) {
                continue;
            }
            if exit_when_found && index.contains(parent) {
                continue;
            }
            seen.insert(parent.clone());
            match store.load(parent).await? {
                Some(item) => stack.push(VersionSnapshot::from_object_item(&item)?),
                None => {
                    err = Some(match tag_of(parent) {
                        Some(tag) => GraphError::VersionNotFound {
                            component: component.clone(),
                            version: tag,
                        },
                        None => GraphError::ParentNotFound {
                            component: component.clone(),
                            child: snapshot.hash.clone(),
                            missing: parent.clone(),
                        },
                    });
                    break 'walk;
                }
            }
        }
    }

    if err.is_some() {
        return Ok(PopulateOutcome { added, err });
    }

    if !added.is_empty() {
        debug!(
            component = %index.component(),
            edges = added.len(),
            "updating ancestry index"
        );
        index.add_all(added.iter().cloned());
        store.write_all(vec![index.to_object_item()?]).await?;
    }
    Ok(PopulateOutcome { added, err: None })
}
