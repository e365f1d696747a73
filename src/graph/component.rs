//! graph::component
//!
//! The version graph of one component: tag map, head pointers, lazy
//! ancestry population, divergence, and the version-insertion state
//! machine.
//!
//! # Architecture
//!
//! [`VersionGraph`] owns everything persisted for a component's history
//! plus the per-session transient state. The object store handle is
//! passed into every operation that needs it; the graph never reaches
//! for ambient state. Ancestry population and divergence are `&self`
//! operations guarded by a per-instance `tokio::sync::Mutex`, so
//! concurrent callers on a shared graph serialize through one guard and
//! share the populated index instead of re-walking.
//!
//! # Persistence
//!
//! The on-disk record is a versioned, strictly-parsed JSON shape. A
//! record carrying neither a schema discriminator nor a head is a
//! legacy graph (tag-only histories written before heads existed) and
//! is exempt from the head-presence invariant.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::core::types::{ComponentKey, ContentRef, LaneRef, TagName};
use crate::graph::divergence::{distance_over_index, SnapsDistance};
use crate::graph::errors::GraphError;
use crate::graph::history::{populate_ancestry, AncestryIndex, PopulateOutcome};
use crate::graph::lane::{BranchContext, Lane, RemoteConfidence, RemoteHeadGuess};
use crate::graph::snapshot::VersionSnapshot;
use crate::store::ObjectStore;

/// Schema discriminator for head-based graph records.
pub const COMPONENT_SCHEMA: &str = "component/2";

/// Persisted schema family of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// Written before heads existed; tag map only.
    Legacy,
    /// Head-based, schema-versioned record.
    HeadBased,
}

/// The deliberately-diverged head pointer.
///
/// Set when a version is inserted with `detach_head`; cleared whenever
/// the main head advances normally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachedHeads {
    current: Option<ContentRef>,
}

impl DetachedHeads {
    /// The current detached head, if any.
    pub fn current(&self) -> Option<&ContentRef> {
        self.current.as_ref()
    }

    /// Record a detached head.
    pub fn set(&mut self, head: ContentRef) {
        self.current = Some(head);
    }

    /// Clear, returning what was recorded.
    pub fn clear(&mut self) -> Option<ContentRef> {
        self.current.take()
    }

    /// Whether no detached head is recorded.
    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }
}

/// Flags for [`VersionGraph::insert_version`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InsertOpts {
    /// Link the new snapshot to the current head even when the resolved
    /// parent is a tagged hash (guards against parent/version hash
    /// collisions).
    pub set_head_as_parent: bool,
    /// Record the new hash as a detached pointer instead of failing when
    /// it does not descend from the current head.
    pub detach_head: bool,
    /// Force the new hash to become head without chaining to the old one.
    pub override_head: bool,
}

/// One entry of a component's history log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Snapshot hash (abbreviated when requested).
    pub hash: String,
    /// Commit-style message.
    pub message: String,
    /// Author username.
    pub username: String,
    /// Author email.
    pub email: String,
    /// Epoch milliseconds, as recorded on the snapshot.
    pub date: i64,
    /// Tag pointing at this snapshot, if any.
    pub tag: Option<String>,
    /// Parent hashes (abbreviated when requested).
    pub parents: Vec<String>,
}

/// Difference between two graphs over their tag maps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphDiff {
    /// Tags present on both sides but pointing at different hashes.
    pub changed: Vec<TagName>,
    /// Tags only this graph has.
    pub only_in_self: Vec<TagName>,
    /// Tags only the other graph has.
    pub only_in_other: Vec<TagName>,
}

impl GraphDiff {
    /// Whether the two tag maps are identical.
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.only_in_self.is_empty() && self.only_in_other.is_empty()
    }
}

/// Persisted shape of a version graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VersionGraphRecord {
    /// Schema discriminator; absent on legacy records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Storage scope.
    pub scope: String,
    /// Component name.
    pub name: String,
    /// Tag to hash map.
    #[serde(default)]
    pub versions: BTreeMap<TagName, ContentRef>,
    /// Tags kept for reference outside the primary map.
    #[serde(default)]
    pub orphaned_versions: BTreeMap<TagName, ContentRef>,
    /// Tip on the default lane.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<ContentRef>,
    /// Deliberately-diverged pointer.
    #[serde(default)]
    pub detached_heads: DetachedHeads,
}

/// The version graph of one component.
///
/// See the module docs for the overall design. Mutating bookkeeping
/// (tags, heads, insertion) takes `&mut self`; ancestry population and
/// divergence take `&self` and serialize through the internal guard, so
/// an `Arc<VersionGraph>` can serve concurrent readers.
pub struct VersionGraph {
    key: ComponentKey,
    versions: BTreeMap<TagName, ContentRef>,
    orphaned_versions: BTreeMap<TagName, ContentRef>,
    head: Option<ContentRef>,
    detached_heads: DetachedHeads,
    schema: SchemaKind,
    /// Versions inserted this session, a display hint only. Never used
    /// as the source of truth for anything destructive.
    local_marks: BTreeSet<String>,
    /// Branch state computed by `populate_heads`.
    context: StdMutex<BranchContext>,
    /// Last computed distance; invalidated by insertion.
    diverge: StdMutex<Option<Arc<SnapsDistance>>>,
    /// Population guard and lazily loaded index, one per instance.
    ancestry: Mutex<Option<AncestryIndex>>,
}

impl std::fmt::Debug for VersionGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionGraph")
            .field("key", &self.key)
            .field("versions", &self.versions)
            .field("head", &self.head)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl VersionGraph {
    /// Create an empty graph for a component.
    pub fn new(key: ComponentKey) -> Self {
        Self {
            key,
            versions: BTreeMap::new(),
            orphaned_versions: BTreeMap::new(),
            head: None,
            detached_heads: DetachedHeads::default(),
            schema: SchemaKind::HeadBased,
            local_marks: BTreeSet::new(),
            context: StdMutex::new(BranchContext::Unknown),
            diverge: StdMutex::new(None),
            ancestry: Mutex::new(None),
        }
    }

    /// The component identity.
    pub fn key(&self) -> &ComponentKey {
        &self.key
    }

    /// The persisted schema family.
    pub fn schema(&self) -> SchemaKind {
        self.schema
    }

    /// The tag map.
    pub fn versions(&self) -> &BTreeMap<TagName, ContentRef> {
        &self.versions
    }

    /// The orphaned tag map.
    pub fn orphaned_versions(&self) -> &BTreeMap<TagName, ContentRef> {
        &self.orphaned_versions
    }

    /// The deliberately-diverged pointer.
    pub fn detached_heads(&self) -> &DetachedHeads {
        &self.detached_heads
    }

    /// The branch state computed by the last `populate_heads` call.
    pub fn branch_context(&self) -> BranchContext {
        lock(&self.context).clone()
    }

    // ----- head accessors -----

    /// The tip on the default lane.
    pub fn head(&self) -> Option<&ContentRef> {
        self.head.as_ref()
    }

    /// Whether a head is set on the default lane.
    pub fn has_head(&self) -> bool {
        self.head.is_some()
    }

    /// The current tip: the lane-local head when checked out to a lane,
    /// the default-lane head otherwise.
    pub fn head_regardless_of_lane(&self) -> Option<ContentRef> {
        lock(&self.context)
            .lane_local_head()
            .cloned()
            .or_else(|| self.head.clone())
    }

    /// The current tip as a tag when one points at it, as a hash string
    /// otherwise.
    pub fn head_as_tag_or_hash(&self) -> Option<String> {
        let head = self.head_regardless_of_lane()?;
        Some(match self.tag_of_ref(&head) {
            Some(tag) => tag.to_string(),
            None => head.to_string(),
        })
    }

    /// Whether the current tip is an untagged snap.
    pub fn is_head_snap(&self) -> bool {
        match self.head_regardless_of_lane() {
            Some(head) => self.tag_of_ref(&head).is_none(),
            None => false,
        }
    }

    fn head_or_latest(&self) -> Result<ContentRef, GraphError> {
        if let Some(head) = self.head_regardless_of_lane() {
            return Ok(head);
        }
        if let Some((_, head)) = self.versions.iter().next_back() {
            return Ok(head.clone());
        }
        Err(GraphError::NoHeadNoVersion {
            component: self.key.clone(),
        })
    }

    // ----- branch-aware head resolution -----

    /// Compute the [`BranchContext`] for this session.
    ///
    /// With no lane (or the default lane) the context is `Main` with the
    /// recorded default-lane remote head. On a named lane, the remote
    /// head used for merge-base math is resolved through a fallback
    /// chain: the lane's own recorded remote head; the fork origin's
    /// remote head (same scope, unexported lanes only); the default
    /// lane's remote head; finally the component's own head, flagged as
    /// an optimistic assumption rather than confirmed remote state.
    pub async fn populate_heads(
        &self,
        store: &dyn ObjectStore,
        lane: Option<&Lane>,
    ) -> Result<(), GraphError> {
        let main_lane = LaneRef::default_lane(self.key.scope())?;
        let main_remote = store.remote_head_for(&main_lane, &self.key).await?;

        let context = match lane {
            None => BranchContext::Main {
                remote_head: main_remote,
            },
            Some(lane) if lane.id.is_default() => BranchContext::Main {
                remote_head: main_remote,
            },
            Some(lane) => {
                let local = lane.component_head(&self.key).cloned();
                let remote = store.remote_head_for(&lane.id, &self.key).await?;
                let calculated = self
                    .calculated_remote_on_lane(store, lane, remote.as_ref(), main_remote.as_ref())
                    .await?;
                BranchContext::OnLane {
                    lane: lane.id.clone(),
                    local,
                    remote,
                    main_remote,
                    calculated_remote: calculated,
                }
            }
        };
        debug!(component = %self.key, ?context, "populated heads");
        *lock(&self.context) = context;
        Ok(())
    }

    async fn calculated_remote_on_lane(
        &self,
        store: &dyn ObjectStore,
        lane: &Lane,
        remote: Option<&ContentRef>,
        main_remote: Option<&ContentRef>,
    ) -> Result<Option<RemoteHeadGuess>, GraphError> {
        if let Some(remote) = remote {
            return Ok(Some(RemoteHeadGuess {
                head: remote.clone(),
                confidence: RemoteConfidence::Confirmed,
            }));
        }
        if lane.is_new() {
            if let Some(origin) = &lane.forked_from {
                if origin.scope() == self.key.scope() {
                    if let Some(head) = store.remote_head_for(origin, &self.key).await? {
                        return Ok(Some(RemoteHeadGuess {
                            head,
                            confidence: RemoteConfidence::Confirmed,
                        }));
                    }
                }
            }
        }
        if let Some(head) = main_remote {
            return Ok(Some(RemoteHeadGuess {
                head: head.clone(),
                confidence: RemoteConfidence::Confirmed,
            }));
        }
        Ok(self.head.clone().map(|head| RemoteHeadGuess {
            head,
            confidence: RemoteConfidence::AssumedLocal,
        }))
    }

    /// The most recent known version, including unconfirmed remote state.
    ///
    /// Prefers the local tip; the remote head wins only when it is
    /// recorded for the current checkout and divergence shows it
    /// strictly ahead. On a lane with no recorded lane remote head the
    /// local tip always wins.
    pub async fn head_include_remote(
        &self,
        store: &dyn ObjectStore,
    ) -> Result<Option<ContentRef>, GraphError> {
        let local = self.head_regardless_of_lane();
        let remote = match self.branch_context() {
            BranchContext::Unknown => None,
            BranchContext::Main { remote_head } => remote_head,
            // Rule 1-3 fallbacks are for merge-base math only; "latest"
            // needs a head recorded for this exact lane.
            BranchContext::OnLane { remote, .. } => remote,
        };
        let Some(remote) = remote else {
            return Ok(local);
        };
        if local.is_none() {
            return Ok(Some(remote));
        }

        let distance = self
            .compute_distance(store, local.as_ref(), Some(&remote), false)
            .await?;
        if distance.is_target_ahead() && !distance.is_source_ahead() {
            Ok(Some(remote))
        } else {
            Ok(local)
        }
    }

    // ----- ancestry population -----

    /// Guarantee the ancestry index covers `head` down to roots or
    /// already-indexed hashes.
    ///
    /// # Errors
    ///
    /// Domain failures from the walk ([`GraphError::HeadNotFound`],
    /// [`GraphError::ParentNotFound`], [`GraphError::VersionNotFound`])
    /// and store IO errors.
    pub async fn ensure_ancestry(
        &self,
        store: &dyn ObjectStore,
        head: &ContentRef,
    ) -> Result<(), GraphError> {
        let outcome = self.populate_ancestry_gracefully(store, head, true).await?;
        match outcome.err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Populate the ancestry index for `head`, returning domain failures
    /// inside the outcome instead of failing the call.
    ///
    /// Pass `exit_when_found = false` to force a full traversal (repair
    /// after an interrupted index write). Concurrent callers serialize
    /// through the per-instance guard; a caller arriving after the walk
    /// finished sees the indexed head and returns without any loads.
    pub async fn populate_ancestry_gracefully(
        &self,
        store: &dyn ObjectStore,
        head: &ContentRef,
        exit_when_found: bool,
    ) -> Result<PopulateOutcome, GraphError> {
        let mut guard = self.ancestry.lock().await;
        let index = Self::loaded_index(&mut guard, store, &self.key).await?;
        populate_ancestry(store, index, head, &self.versions, exit_when_found).await
    }

    async fn loaded_index<'a>(
        slot: &'a mut Option<AncestryIndex>,
        store: &dyn ObjectStore,
        component: &ComponentKey,
    ) -> Result<&'a mut AncestryIndex, GraphError> {
        let index = match slot.take() {
            Some(index) => index,
            None => AncestryIndex::load_or_default(store, component).await?,
        };
        Ok(slot.insert(index))
    }

    /// Walk `generations` first-parent steps back from the current tip.
    ///
    /// Returns `Ok(None)` when the chain ends (a root is reached) before
    /// covering the requested distance.
    pub async fn ref_of_ancestor(
        &self,
        store: &dyn ObjectStore,
        generations: usize,
    ) -> Result<Option<ContentRef>, GraphError> {
        let head = self.head_or_latest()?;
        self.ensure_ancestry(store, &head).await?;
        let guard = self.ancestry.lock().await;
        Ok(guard
            .as_ref()
            .and_then(|index| index.ancestor(&head, generations)))
    }

    // ----- divergence -----

    async fn compute_distance(
        &self,
        store: &dyn ObjectStore,
        source: Option<&ContentRef>,
        target: Option<&ContentRef>,
        throws: bool,
    ) -> Result<Arc<SnapsDistance>, GraphError> {
        let mut guard = self.ancestry.lock().await;
        let index = Self::loaded_index(&mut guard, store, &self.key).await?;

        for head in [source, target].into_iter().flatten() {
            let outcome = populate_ancestry(store, index, head, &self.versions, true).await?;
            if let Some(err) = outcome.err {
                if throws {
                    return Err(err);
                }
                trace!(component = %self.key, %err, "divergence degraded to unknown");
                return Ok(Arc::new(SnapsDistance::unknown(err)));
            }
        }
        match distance_over_index(index, source, target) {
            Ok(distance) => Ok(Arc::new(distance)),
            Err(err) if !throws => Ok(Arc::new(SnapsDistance::unknown(err))),
            Err(err) => Err(err),
        }
    }

    /// Compute and cache the distance between the current tip (or
    /// `workspace_version` when given) and the branch-aware remote head.
    /// `workspace_version` only applies off-lane; on a lane the lane
    /// head is always the source.
    ///
    /// With `from_cache` a previously computed distance is reused;
    /// pass `false` after an import or any operation that may have
    /// changed repository state. With `throws = false` resolution
    /// failures come back inside the cached distance as "unknown".
    pub async fn set_diverge_data(
        &self,
        store: &dyn ObjectStore,
        workspace_version: Option<&ContentRef>,
        throws: bool,
        from_cache: bool,
    ) -> Result<Arc<SnapsDistance>, GraphError> {
        if from_cache {
            if let Some(cached) = lock(&self.diverge).clone() {
                return Ok(cached);
            }
        }
        let source = match workspace_version {
            Some(version) if !self.branch_context().is_on_lane() => Some(version.clone()),
            _ => self.head_regardless_of_lane(),
        };
        let target = match self.branch_context() {
            BranchContext::Unknown => None,
            BranchContext::Main { remote_head } => remote_head,
            BranchContext::OnLane {
                calculated_remote, ..
            } => calculated_remote.map(|guess| guess.head),
        };
        let distance = self
            .compute_distance(store, source.as_ref(), target.as_ref(), throws)
            .await?;
        *lock(&self.diverge) = Some(distance.clone());
        Ok(distance)
    }

    /// The last cached distance, if any.
    pub fn diverge_data(&self) -> Option<Arc<SnapsDistance>> {
        lock(&self.diverge).clone()
    }

    /// Distance against the recorded remote head of the current checkout
    /// for merge-pending checks; never fails on unresolvable history
    /// (comes back as "unknown").
    ///
    /// Unlike [`set_diverge_data`](Self::set_diverge_data) this never
    /// falls back to the main remote head on a lane. A never-exported
    /// lane has no recorded remote, so its whole history counts as
    /// pending. Does not touch the cached distance.
    pub async fn diverge_data_for_merge_pending(
        &self,
        store: &dyn ObjectStore,
    ) -> Result<Arc<SnapsDistance>, GraphError> {
        let source = self.head_regardless_of_lane();
        let target = self.branch_context().recorded_remote_head().cloned();
        self.compute_distance(store, source.as_ref(), target.as_ref(), false)
            .await
    }

    // ----- local/staged detection -----

    /// Locally-known hashes not yet confirmed on the remote,
    /// oldest-first. Divergence-backed; this is the authoritative list.
    pub async fn local_hashes(
        &self,
        store: &dyn ObjectStore,
    ) -> Result<Vec<ContentRef>, GraphError> {
        let distance = self.set_diverge_data(store, None, false, true).await?;
        if distance.err().is_some() {
            return Ok(Vec::new());
        }
        Ok(distance.source_only_oldest_first())
    }

    /// Like [`local_hashes`](Self::local_hashes), with tags substituted
    /// for tagged hashes for display.
    pub async fn local_tags_or_hashes(
        &self,
        store: &dyn ObjectStore,
    ) -> Result<Vec<String>, GraphError> {
        let hashes = self.local_hashes(store).await?;
        Ok(self.switch_hashes_with_tags(&hashes))
    }

    /// Versions inserted this session. A same-session display hint only;
    /// destructive flows must use [`local_hashes`](Self::local_hashes).
    pub fn local_versions(&self) -> Vec<&str> {
        self.local_marks.iter().map(String::as_str).collect()
    }

    // ----- tag bookkeeping -----

    /// Record a tag. An orphaned entry under the same tag is promoted.
    pub fn set_version(&mut self, tag: TagName, head: ContentRef) {
        self.orphaned_versions.remove(&tag);
        self.versions.insert(tag, head);
    }

    /// Record an orphaned tag (kept for reference outside the primary
    /// map, e.g. recovered from a lane merge).
    ///
    /// # Errors
    ///
    /// [`GraphError::Validation`] if the tag exists in the primary map.
    pub fn set_orphaned_version(
        &mut self,
        tag: TagName,
        head: ContentRef,
    ) -> Result<(), GraphError> {
        if self.versions.contains_key(&tag) {
            return Err(GraphError::Validation {
                component: self.key.clone(),
                reason: format!(
                    "unable to set \"{tag}\" as orphaned, it already exists in versions"
                ),
            });
        }
        self.orphaned_versions.insert(tag, head);
        Ok(())
    }

    /// Remove a tag from the primary map, returning its hash.
    pub fn remove_version(&mut self, tag: &TagName) -> Option<ContentRef> {
        self.local_marks.remove(tag.as_str());
        self.versions.remove(tag)
    }

    /// All tags in ascending semver order.
    pub fn list_versions(&self) -> Vec<&TagName> {
        self.versions.keys().collect()
    }

    /// The highest tag, if any.
    pub fn latest_version(&self) -> Option<&TagName> {
        self.versions.keys().next_back()
    }

    /// The tag pointing at a hash, primary map first.
    pub fn tag_of_ref(&self, head: &ContentRef) -> Option<&TagName> {
        self.versions
            .iter()
            .chain(self.orphaned_versions.iter())
            .find(|(_, r)| *r == head)
            .map(|(tag, _)| tag)
    }

    /// Substitute tags for tagged hashes, for display.
    pub fn switch_hashes_with_tags(&self, hashes: &[ContentRef]) -> Vec<String> {
        hashes
            .iter()
            .map(|hash| match self.tag_of_ref(hash) {
                Some(tag) => tag.to_string(),
                None => hash.to_string(),
            })
            .collect()
    }

    /// The tag map merged with orphaned entries (primary entries win).
    pub fn versions_include_orphaned(&self) -> BTreeMap<&TagName, &ContentRef> {
        let mut merged: BTreeMap<&TagName, &ContentRef> = self.orphaned_versions.iter().collect();
        merged.extend(self.versions.iter());
        merged
    }

    /// Resolve a tag or hash string to a ref.
    ///
    /// # Errors
    ///
    /// [`GraphError::VersionNotFound`] for an unknown tag;
    /// [`GraphError::Type`] for a string that is neither.
    pub fn get_ref(&self, tag_or_hash: &str) -> Result<ContentRef, GraphError> {
        if TagName::is_tag(tag_or_hash) {
            let tag = TagName::new(tag_or_hash)?;
            return self
                .versions
                .get(&tag)
                .or_else(|| self.orphaned_versions.get(&tag))
                .cloned()
                .ok_or_else(|| GraphError::VersionNotFound {
                    component: self.key.clone(),
                    version: tag_or_hash.to_string(),
                });
        }
        Ok(ContentRef::new(tag_or_hash)?)
    }

    /// Whether a version exists: a known tag, or a hash (full or
    /// prefix) present in the populated ancestry of the current tip.
    pub async fn has_version(
        &self,
        store: &dyn ObjectStore,
        version: &str,
    ) -> Result<bool, GraphError> {
        if TagName::is_tag(version) {
            let tag = TagName::new(version)?;
            return Ok(self.versions.contains_key(&tag)
                || self.orphaned_versions.contains_key(&tag));
        }
        let Ok(head) = self.head_or_latest() else {
            return Ok(false);
        };
        // Degraded population still lets prefix lookup answer from
        // whatever is indexed.
        let _ = self.populate_ancestry_gracefully(store, &head, true).await?;
        let guard = self.ancestry.lock().await;
        Ok(guard
            .as_ref()
            .map(|index| index.hashes().any(|hash| hash.as_str().starts_with(version)))
            .unwrap_or(false))
    }

    /// The exact tag to record for a new version.
    ///
    /// # Errors
    ///
    /// [`GraphError::VersionAlreadyExists`] when the tag is taken.
    pub fn get_version_to_add(&self, exact: &TagName) -> Result<TagName, GraphError> {
        if self.versions.contains_key(exact) {
            return Err(GraphError::VersionAlreadyExists {
                component: self.key.clone(),
                version: exact.to_string(),
            });
        }
        Ok(exact.clone())
    }

    // ----- insertion -----

    /// Insert a new version. Returns the tag or hash recorded.
    ///
    /// On a named lane the snapshot becomes the lane's head for this
    /// component; tagging there is rejected. On the default lane the
    /// snapshot chains onto the resolved parent and advances the head,
    /// unless it descends from an older version, in which case the
    /// caller must pick `detach_head` or `override_head` explicitly.
    ///
    /// The new snapshot's parent list is rewritten in place; callers
    /// persist the snapshot afterwards through the external
    /// serialization layer.
    pub fn insert_version(
        &mut self,
        snapshot: &mut VersionSnapshot,
        tag_or_hash: &str,
        lane: Option<&mut Lane>,
        previously_used: Option<&str>,
        opts: InsertOpts,
    ) -> Result<String, GraphError> {
        if opts.detach_head && opts.override_head {
            return Err(GraphError::DetachAndOverride);
        }
        let tag = if TagName::is_tag(tag_or_hash) {
            Some(TagName::new(tag_or_hash)?)
        } else {
            None
        };
        let parent = previously_used.map(|v| self.get_ref(v)).transpose()?;

        match lane {
            Some(lane) if !lane.id.is_default() => {
                self.insert_on_lane(snapshot, tag.as_ref(), lane, parent)?
            }
            _ => self.insert_on_main(snapshot, tag, parent, previously_used, opts)?,
        }

        debug!(component = %self.key, version = tag_or_hash, hash = %snapshot.hash, "inserted version");
        self.local_marks.insert(tag_or_hash.to_string());
        *lock(&self.diverge) = None;
        Ok(tag_or_hash.to_string())
    }

    fn insert_on_lane(
        &mut self,
        snapshot: &mut VersionSnapshot,
        tag: Option<&TagName>,
        lane: &mut Lane,
        parent: Option<ContentRef>,
    ) -> Result<(), GraphError> {
        if tag.is_some() {
            return Err(GraphError::TagOnLane);
        }
        match parent {
            Some(parent) => {
                if parent != snapshot.hash {
                    snapshot.set_only_parent(parent);
                }
            }
            None => {
                if let Some(head) = lane.component_head(&self.key) {
                    return Err(GraphError::MissingPreviousVersion {
                        component: self.key.clone(),
                        head: head.clone(),
                    });
                }
            }
        }
        lane.set_component_head(self.key.clone(), snapshot.hash.clone());

        let context = lock(&self.context).clone();
        if let BranchContext::OnLane {
            lane: lane_ref,
            remote,
            main_remote,
            calculated_remote,
            ..
        } = context
        {
            *lock(&self.context) = BranchContext::OnLane {
                lane: lane_ref,
                local: Some(snapshot.hash.clone()),
                remote,
                main_remote,
                calculated_remote,
            };
        }
        Ok(())
    }

    fn insert_on_main(
        &mut self,
        snapshot: &mut VersionSnapshot,
        tag: Option<TagName>,
        parent: Option<ContentRef>,
        previously_used: Option<&str>,
        opts: InsertOpts,
    ) -> Result<(), GraphError> {
        let head = self.head.clone();
        let diverged = matches!((&parent, &head), (Some(p), Some(h)) if p != h);
        let retag = tag.as_ref().map_or(false, |t| self.versions.contains_key(t));

        if diverged {
            // parent and head are both set here.
            let (Some(parent), Some(head)) = (parent, head) else {
                return Err(GraphError::Validation {
                    component: self.key.clone(),
                    reason: "diverged insertion without parent and head".into(),
                });
            };
            if opts.detach_head {
                if parent != snapshot.hash {
                    snapshot.set_only_parent(parent);
                }
                self.detached_heads.set(snapshot.hash.clone());
            } else if opts.override_head {
                if parent != snapshot.hash {
                    snapshot.set_only_parent(parent);
                }
                self.head = Some(snapshot.hash.clone());
                self.detached_heads.clear();
            } else {
                return Err(GraphError::DivergedOnMain {
                    component: self.key.clone(),
                    head,
                    previously_used: previously_used.unwrap_or_default().to_string(),
                });
            }
        } else {
            // Re-tagging an existing tag replaces its hash; the head it
            // orphans is not linked as a parent unless asked for.
            let parent_to_set = if opts.set_head_as_parent {
                head
            } else if retag {
                None
            } else {
                parent.or(head)
            };
            if let Some(parent) = parent_to_set {
                if parent != snapshot.hash {
                    snapshot.set_only_parent(parent);
                }
            }
            self.head = Some(snapshot.hash.clone());
            self.detached_heads.clear();
        }

        // Any head-bearing write upgrades a legacy record.
        self.schema = SchemaKind::HeadBased;
        if let Some(tag) = tag {
            self.set_version(tag, snapshot.hash.clone());
        }
        Ok(())
    }

    // ----- logs / comparison -----

    /// The history log of the current tip, earliest-first.
    ///
    /// Snapshots missing from local storage are skipped rather than
    /// failing the whole log.
    pub async fn collect_logs(
        &self,
        store: &dyn ObjectStore,
        short_hash: bool,
    ) -> Result<Vec<LogEntry>, GraphError> {
        let head = self.head_or_latest()?;
        self.ensure_ancestry(store, &head).await?;

        let ordered = {
            let guard = self.ancestry.lock().await;
            let mut hashes = match guard.as_ref() {
                Some(index) => self.reachable_from(index, &head),
                None => Vec::new(),
            };
            hashes.reverse();
            hashes
        };

        let items = store.load_many_ignore_missing(&ordered).await?;
        let mut entries = Vec::with_capacity(items.len());
        for item in &items {
            let snapshot = VersionSnapshot::from_object_item(item)?;
            let render = |hash: &ContentRef| {
                if short_hash {
                    hash.short(9).to_string()
                } else {
                    hash.to_string()
                }
            };
            entries.push(LogEntry {
                hash: render(&snapshot.hash),
                message: snapshot.log.message.clone(),
                username: snapshot.log.username.clone(),
                email: snapshot.log.email.clone(),
                date: snapshot.log.timestamp.as_millis(),
                tag: self.tag_of_ref(&snapshot.hash).map(|t| t.to_string()),
                parents: snapshot.parents.iter().map(render).collect(),
            });
        }
        Ok(entries)
    }

    fn reachable_from(&self, index: &AncestryIndex, head: &ContentRef) -> Vec<ContentRef> {
        let mut seen = BTreeSet::new();
        let mut ordered = Vec::new();
        let mut stack = vec![head.clone()];
        seen.insert(head.clone());
        while let Some(hash) = stack.pop() {
            if let Some(parents) = index.parents_of(&hash) {
                for parent in parents.iter().rev() {
                    if seen.insert(parent.clone()) {
                        stack.push(parent.clone());
                    }
                }
            }
            ordered.push(hash);
        }
        ordered
    }

    /// Whether two graphs agree on identity, head and both tag maps.
    pub fn is_equal(&self, other: &VersionGraph) -> bool {
        self.key == other.key
            && self.head == other.head
            && self.versions == other.versions
            && self.orphaned_versions == other.orphaned_versions
    }

    /// Tag-map difference against another graph.
    pub fn diff_with(&self, other: &VersionGraph) -> GraphDiff {
        let mut diff = GraphDiff::default();
        for (tag, head) in &self.versions {
            match other.versions.get(tag) {
                None => diff.only_in_self.push(tag.clone()),
                Some(theirs) if theirs != head => diff.changed.push(tag.clone()),
                Some(_) => {}
            }
        }
        for tag in other.versions.keys() {
            if !self.versions.contains_key(tag) {
                diff.only_in_other.push(tag.clone());
            }
        }
        diff
    }

    // ----- persistence -----

    /// Structural invariants, checked before any serialization.
    ///
    /// # Errors
    ///
    /// [`GraphError::Validation`]; always fatal for the write, never
    /// silently repaired.
    pub fn validate(&self) -> Result<(), GraphError> {
        trace!(component = %self.key, "validating version graph");
        let fail = |reason: String| GraphError::Validation {
            component: self.key.clone(),
            reason,
        };

        for tag in self.orphaned_versions.keys() {
            if self.versions.contains_key(tag) {
                return Err(fail(format!(
                    "the version \"{tag}\" exists in both versions and orphanedVersions"
                )));
            }
        }

        let mut by_hash: HashMap<&ContentRef, &TagName> = HashMap::new();
        for (tag, head) in &self.versions {
            if let Some(first) = by_hash.insert(head, tag) {
                return Err(fail(format!(
                    "the versions \"{first}\" and \"{tag}\" point to the same hash {head}"
                )));
            }
        }

        if self.schema == SchemaKind::HeadBased && !self.versions.is_empty() && self.head.is_none()
        {
            return Err(fail("the \"head\" prop is missing".into()));
        }
        Ok(())
    }

    /// The persistable record.
    pub fn to_record(&self) -> VersionGraphRecord {
        VersionGraphRecord {
            schema: match self.schema {
                SchemaKind::Legacy => None,
                SchemaKind::HeadBased => Some(COMPONENT_SCHEMA.to_string()),
            },
            scope: self.key.scope().to_string(),
            name: self.key.name().to_string(),
            versions: self.versions.clone(),
            orphaned_versions: self.orphaned_versions.clone(),
            head: self.head.clone(),
            detached_heads: self.detached_heads.clone(),
        }
    }

    /// Rebuild a graph from its record.
    ///
    /// A record with no schema discriminator is legacy when it also has
    /// no head; a head-bearing record without a discriminator is treated
    /// as head-based (written by a version that predates the field).
    pub fn from_record(record: VersionGraphRecord) -> Result<Self, GraphError> {
        let key = ComponentKey::new(record.scope, record.name)?;
        let schema = match &record.schema {
            Some(schema) if schema.as_str() == COMPONENT_SCHEMA => SchemaKind::HeadBased,
            Some(schema) => {
                return Err(GraphError::Validation {
                    component: key,
                    reason: format!("unsupported schema \"{schema}\""),
                })
            }
            None if record.head.is_none() => SchemaKind::Legacy,
            None => SchemaKind::HeadBased,
        };
        let mut graph = Self::new(key);
        graph.versions = record.versions;
        graph.orphaned_versions = record.orphaned_versions;
        graph.head = record.head;
        graph.detached_heads = record.detached_heads;
        graph.schema = schema;
        Ok(graph)
    }

    /// Parse a serialized graph record.
    pub fn parse(bytes: &[u8]) -> Result<Self, GraphError> {
        let record: VersionGraphRecord =
            serde_json::from_slice(bytes).map_err(|e| GraphError::Parse(e.to_string()))?;
        Self::from_record(record)
    }

    /// Serialize for persistence: validate, serialize, then re-parse and
    /// re-validate the serialized form so a corrupt record can never be
    /// written.
    pub fn to_bytes(&self) -> Result<Vec<u8>, GraphError> {
        self.validate()?;
        let bytes =
            serde_json::to_vec(&self.to_record()).map_err(|e| GraphError::Validation {
                component: self.key.clone(),
                reason: format!("unable to serialize version graph: {e}"),
            })?;
        Self::parse(&bytes)?.validate()?;
        Ok(bytes)
    }
}
