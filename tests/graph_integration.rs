//! End-to-end flows over a seeded in-memory store: tagging, snapping,
//! divergence, lane head resolution and concurrent ancestry population.

use std::sync::Arc;

use strata::core::types::{ComponentKey, ContentRef, LaneRef, TagName, UtcTimestamp};
use strata::graph::component::{InsertOpts, VersionGraph};
use strata::graph::errors::GraphError;
use strata::graph::history::AncestryIndex;
use strata::graph::lane::Lane;
use strata::graph::snapshot::{SnapshotLog, VersionSnapshot};
use strata::store::memory::MemoryStore;

fn key() -> ComponentKey {
    ComponentKey::new("acme", "button").unwrap()
}

fn tag(s: &str) -> TagName {
    TagName::new(s).unwrap()
}

fn log(msg: &str) -> SnapshotLog {
    SnapshotLog {
        message: msg.into(),
        username: "dev".into(),
        email: "dev@example.com".into(),
        timestamp: UtcTimestamp::from_millis(1_700_000_000_000),
    }
}

fn snap(msg: &str, parents: Vec<ContentRef>) -> VersionSnapshot {
    VersionSnapshot::new(ContentRef::from_content(msg.as_bytes()), parents, log(msg))
}

fn seed(store: &MemoryStore, snapshot: &VersionSnapshot) {
    store.seed(snapshot.to_object_item().unwrap());
}

#[tokio::test]
async fn fresh_entity_first_tag_is_fully_staged() {
    let store = MemoryStore::new();
    let mut graph = VersionGraph::new(key());

    let mut h1 = snap("h1", vec![]);
    graph
        .insert_version(&mut h1, "0.0.1", None, None, InsertOpts::default())
        .unwrap();
    seed(&store, &h1);

    assert_eq!(graph.head(), Some(&h1.hash));
    assert_eq!(graph.versions().get(&tag("0.0.1")), Some(&h1.hash));

    // No remote known at all: everything local counts as ahead.
    let distance = graph
        .set_diverge_data(&store, None, true, false)
        .await
        .unwrap();
    assert!(distance.is_source_ahead());
    assert!(!distance.is_target_ahead());

    let staged = graph.local_hashes(&store).await.unwrap();
    assert_eq!(staged, vec![h1.hash.clone()]);
    assert_eq!(
        graph.local_tags_or_hashes(&store).await.unwrap(),
        vec!["0.0.1".to_string()]
    );
}

#[tokio::test]
async fn second_version_chains_and_lands_in_the_persisted_index() {
    let store = MemoryStore::new();
    let mut graph = VersionGraph::new(key());

    let mut h1 = snap("h1", vec![]);
    graph
        .insert_version(&mut h1, "0.0.1", None, None, InsertOpts::default())
        .unwrap();
    seed(&store, &h1);

    let mut h2 = snap("h2", vec![]);
    graph
        .insert_version(&mut h2, "0.0.2", None, Some("0.0.1"), InsertOpts::default())
        .unwrap();
    seed(&store, &h2);

    assert_eq!(graph.head(), Some(&h2.hash));
    assert_eq!(h2.parents, vec![h1.hash.clone()]);

    graph.ensure_ancestry(&store, &h2.hash).await.unwrap();
    let index = AncestryIndex::load_or_default(&store, &key()).await.unwrap();
    assert_eq!(index.parents_of(&h2.hash), Some(&[h1.hash.clone()][..]));
    assert_eq!(index.parents_of(&h1.hash), Some(&[][..]));
}

#[tokio::test]
async fn diverged_insert_needs_a_flag_and_detach_records_the_pointer() {
    let store = MemoryStore::new();
    let mut graph = VersionGraph::new(key());

    let mut h1 = snap("h1", vec![]);
    graph
        .insert_version(&mut h1, "0.0.1", None, None, InsertOpts::default())
        .unwrap();
    let mut h2 = snap("h2", vec![]);
    graph
        .insert_version(&mut h2, "0.0.2", None, Some("0.0.1"), InsertOpts::default())
        .unwrap();
    for s in [&h1, &h2] {
        seed(&store, s);
    }

    let mut h3 = snap("h3", vec![]);
    let err = graph
        .insert_version(&mut h3, "0.0.3", None, Some("0.0.1"), InsertOpts::default())
        .unwrap_err();
    assert!(matches!(err, GraphError::DivergedOnMain { .. }));

    graph
        .insert_version(
            &mut h3,
            "0.0.3",
            None,
            Some("0.0.1"),
            InsertOpts {
                detach_head: true,
                ..Default::default()
            },
        )
        .unwrap();
    seed(&store, &h3);

    assert_eq!(graph.head(), Some(&h2.hash));
    assert_eq!(graph.detached_heads().current(), Some(&h3.hash));
    assert_eq!(h3.parents, vec![h1.hash.clone()]);

    // The detached state round-trips through persistence.
    let parsed = VersionGraph::parse(&graph.to_bytes().unwrap()).unwrap();
    assert_eq!(parsed.detached_heads().current(), Some(&h3.hash));
}

#[tokio::test]
async fn new_lane_falls_back_to_main_remote_head() {
    let store = MemoryStore::new();
    let mut graph = VersionGraph::new(key());

    let mut h1 = snap("h1", vec![]);
    graph
        .insert_version(&mut h1, "0.0.1", None, None, InsertOpts::default())
        .unwrap();
    let mut h2 = snap("h2", vec![]);
    graph
        .insert_version(&mut h2, "0.0.2", None, Some("0.0.1"), InsertOpts::default())
        .unwrap();
    for s in [&h1, &h2] {
        seed(&store, s);
    }
    store.set_remote_head(LaneRef::default_lane("acme").unwrap(), key(), h2.hash.clone());

    let lane = Lane::forked(
        LaneRef::new("acme", "lane-a").unwrap(),
        LaneRef::default_lane("acme").unwrap(),
    );
    graph.populate_heads(&store, Some(&lane)).await.unwrap();

    let context = graph.branch_context();
    assert!(context.is_on_lane());
    // No lane remote head recorded yet; main's remote head stands in.
    assert!(context.recorded_remote_head().is_none());
    let guess = context.calculated_remote().unwrap();
    assert_eq!(guess.head, h2.hash);
    assert!(guess.is_confirmed());
}

#[tokio::test]
async fn missing_untagged_parent_fails_without_touching_the_index() {
    let store = MemoryStore::new();
    let graph = VersionGraph::new(key());

    let h4 = snap("h4", vec![]);
    let h5 = snap("h5", vec![h4.hash.clone()]);
    // h4 exists in history but was never fetched locally.
    seed(&store, &h5);

    let outcome = graph
        .populate_ancestry_gracefully(&store, &h5.hash, true)
        .await
        .unwrap();
    match outcome.err {
        Some(GraphError::ParentNotFound { child, missing, .. }) => {
            assert_eq!(child, h5.hash);
            assert_eq!(missing, h4.hash);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(!store.contains(&AncestryIndex::record_address(&key())));
}

#[tokio::test]
async fn concurrent_divergence_shares_one_population_run() {
    let store = MemoryStore::new();
    let root = snap("root", vec![]);
    let h1 = snap("h1", vec![root.hash.clone()]);
    let h2 = snap("h2", vec![h1.hash.clone()]);
    for s in [&root, &h1, &h2] {
        seed(&store, s);
    }
    store.set_remote_head(LaneRef::default_lane("acme").unwrap(), key(), root.hash.clone());

    let mut graph = VersionGraph::new(key());
    let mut tip = snap("h2", vec![]);
    let tip_name = tip.hash.to_string();
    graph
        .insert_version(&mut tip, &tip_name, None, Some(h1.hash.as_str()), InsertOpts::default())
        .unwrap();
    graph.populate_heads(&store, None).await.unwrap();

    let graph = Arc::new(graph);
    let (a, b) = tokio::join!(
        graph.set_diverge_data(&store, None, true, true),
        graph.set_diverge_data(&store, None, true, true),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert_eq!(a.snaps_on_source_only(), b.snaps_on_source_only());
    assert_eq!(a.snaps_on_target_only(), b.snaps_on_target_only());
    assert_eq!(a.common_snap_before_diverge(), b.common_snap_before_diverge());
    assert!(a.is_source_ahead());
    assert!(!a.is_target_ahead());

    // One population run walked the chain; the second caller saw the
    // indexed head and issued no loads of its own.
    for s in [&root, &h1, &h2] {
        assert_eq!(store.load_count(&s.hash), 1, "duplicate load of {}", s.hash);
    }
}

#[tokio::test]
async fn lane_snaps_then_merge_pending_uses_recorded_lane_remote_only() {
    let store = MemoryStore::new();
    let mut graph = VersionGraph::new(key());

    // Main history, exported: remote head is h1.
    let mut h1 = snap("h1", vec![]);
    graph
        .insert_version(&mut h1, "0.0.1", None, None, InsertOpts::default())
        .unwrap();
    seed(&store, &h1);
    store.set_remote_head(LaneRef::default_lane("acme").unwrap(), key(), h1.hash.clone());

    // Snap twice on a lane forked from main.
    let mut lane = Lane::forked(
        LaneRef::new("acme", "lane-a").unwrap(),
        LaneRef::default_lane("acme").unwrap(),
    );
    graph.populate_heads(&store, Some(&lane)).await.unwrap();

    let mut s1 = snap("s1", vec![]);
    let s1_name = s1.hash.to_string();
    graph
        .insert_version(
            &mut s1,
            &s1_name,
            Some(&mut lane),
            Some(h1.hash.as_str()),
            InsertOpts::default(),
        )
        .unwrap();
    seed(&store, &s1);

    let mut s2 = snap("s2", vec![]);
    let s2_name = s2.hash.to_string();
    graph
        .insert_version(
            &mut s2,
            &s2_name,
            Some(&mut lane),
            Some(s1.hash.as_str()),
            InsertOpts::default(),
        )
        .unwrap();
    seed(&store, &s2);

    assert_eq!(graph.head_regardless_of_lane(), Some(s2.hash.clone()));
    assert_eq!(graph.head(), Some(&h1.hash));

    // The lane was never exported: no recorded lane remote. The main
    // remote head must not stand in as the merge-pending target, so the
    // whole lane history (back to its main base) counts as pending.
    let distance = graph.diverge_data_for_merge_pending(&store).await.unwrap();
    assert!(distance.err().is_none());
    assert!(!distance.is_target_ahead());
    assert_eq!(
        distance.source_only_oldest_first(),
        vec![h1.hash.clone(), s1.hash.clone(), s2.hash.clone()]
    );
    assert!(distance.common_snap_before_diverge().is_none());

    // And it never populates the regular divergence cache.
    assert!(graph.diverge_data().is_none());
}

#[tokio::test]
async fn head_include_remote_follows_a_fast_forwarded_remote() {
    let store = MemoryStore::new();
    let mut graph = VersionGraph::new(key());

    let mut h1 = snap("h1", vec![]);
    graph
        .insert_version(&mut h1, "0.0.1", None, None, InsertOpts::default())
        .unwrap();
    seed(&store, &h1);

    // The remote moved on to h2 (fetched but not checked out).
    let h2 = snap("h2", vec![h1.hash.clone()]);
    seed(&store, &h2);
    store.set_remote_head(LaneRef::default_lane("acme").unwrap(), key(), h2.hash.clone());

    graph.populate_heads(&store, None).await.unwrap();
    let resolved = graph.head_include_remote(&store).await.unwrap();
    assert_eq!(resolved, Some(h2.hash));
}
