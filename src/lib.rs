//! Content-addressed, branch-aware version graphs for versioned
//! components.
//!
//! Each component's history is an immutable, hash-addressed commit
//! graph. The crate resolves the current head across branches
//! ("lanes"), detects divergence between local and remote history,
//! lazily rebuilds ancestry indexes from partial local data, and
//! enforces structural invariants before anything is persisted.
//!
//! # Modules
//!
//! - [`core`] - validated domain types (refs, tags, component and lane
//!   identities, timestamps)
//! - [`store`] - the async object-store seam and an in-memory test
//!   implementation
//! - [`graph`] - snapshots, the ancestry index, lanes, divergence and
//!   the orchestrating [`VersionGraph`](graph::VersionGraph)
//!
//! # Example
//!
//! ```
//! use strata::core::types::{ComponentKey, ContentRef, UtcTimestamp};
//! use strata::graph::component::{InsertOpts, VersionGraph};
//! use strata::graph::snapshot::{SnapshotLog, VersionSnapshot};
//! use strata::store::memory::MemoryStore;
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new();
//! let key = ComponentKey::new("acme", "button").unwrap();
//! let mut graph = VersionGraph::new(key);
//!
//! let mut first = VersionSnapshot::new(
//!     ContentRef::from_content(b"first"),
//!     vec![],
//!     SnapshotLog {
//!         message: "initial".into(),
//!         username: "dev".into(),
//!         email: "dev@example.com".into(),
//!         timestamp: UtcTimestamp::now(),
//!     },
//! );
//! graph
//!     .insert_version(&mut first, "0.0.1", None, None, InsertOpts::default())
//!     .unwrap();
//! store.seed(first.to_object_item().unwrap());
//! assert_eq!(graph.head(), Some(&first.hash));
//!
//! // No remote recorded yet, so the whole history is local-only.
//! let distance = graph.set_diverge_data(&store, None, true, false).await.unwrap();
//! assert!(distance.is_source_ahead());
//! # });
//! ```

pub mod core;
pub mod graph;
pub mod store;
