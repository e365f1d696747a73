//! graph::snapshot
//!
//! Immutable version snapshots.
//!
//! A snapshot is one historical state of a component: its own content
//! ref, the refs of its parents, and log metadata. A snapshot with zero
//! parents is a root. Snapshots are produced and hashed by the external
//! serialization layer; this crate only reads them back and, during
//! insertion, rewrites the parent edge.

use serde::{Deserialize, Serialize};

use crate::core::types::{ContentRef, UtcTimestamp};
use crate::store::{ObjectItem, StoreError};

/// Log metadata attached to a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotLog {
    /// Commit-style message.
    pub message: String,
    /// Author username.
    pub username: String,
    /// Author email.
    pub email: String,
    /// When the snapshot was created.
    pub timestamp: UtcTimestamp,
}

/// One historical state of a component.
///
/// # Example
///
/// ```
/// use strata::graph::snapshot::{SnapshotLog, VersionSnapshot};
/// use strata::core::types::{ContentRef, UtcTimestamp};
///
/// let root = VersionSnapshot::new(
///     ContentRef::from_content(b"v1"),
///     vec![],
///     SnapshotLog {
///         message: "initial".into(),
///         username: "dev".into(),
///         email: "dev@example.com".into(),
///         timestamp: UtcTimestamp::now(),
///     },
/// );
/// assert!(root.is_root());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSnapshot {
    /// This snapshot's own content ref.
    pub hash: ContentRef,
    /// Parent snapshot refs; empty for a root.
    pub parents: Vec<ContentRef>,
    /// Log metadata.
    pub log: SnapshotLog,
}

impl VersionSnapshot {
    /// Create a snapshot.
    pub fn new(hash: ContentRef, parents: Vec<ContentRef>, log: SnapshotLog) -> Self {
        Self { hash, parents, log }
    }

    /// Whether this snapshot has no parents.
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// Replace the parent list with exactly one entry.
    ///
    /// Used by version insertion to chain the new snapshot onto the
    /// resolved parent. Any previously recorded parents are discarded.
    pub fn set_only_parent(&mut self, parent: ContentRef) {
        self.parents = vec![parent];
    }

    /// Serialize for the object store.
    pub fn to_object_item(&self) -> Result<ObjectItem, StoreError> {
        let bytes = serde_json::to_vec(self).map_err(|e| StoreError::Corrupt {
            reference: self.hash.clone(),
            message: e.to_string(),
        })?;
        Ok(ObjectItem {
            reference: self.hash.clone(),
            bytes,
        })
    }

    /// Parse a stored object back into a snapshot.
    ///
    /// # Errors
    ///
    /// [`StoreError::Corrupt`] if the bytes are not a snapshot record.
    pub fn from_object_item(item: &ObjectItem) -> Result<Self, StoreError> {
        serde_json::from_slice(&item.bytes).map_err(|e| StoreError::Corrupt {
            reference: item.reference.clone(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> SnapshotLog {
        SnapshotLog {
            message: "change".into(),
            username: "dev".into(),
            email: "dev@example.com".into(),
            timestamp: UtcTimestamp::from_millis(1_700_000_000_000),
        }
    }

    #[test]
    fn root_detection() {
        let root = VersionSnapshot::new(ContentRef::from_content(b"r"), vec![], log());
        assert!(root.is_root());

        let child = VersionSnapshot::new(
            ContentRef::from_content(b"c"),
            vec![root.hash.clone()],
            log(),
        );
        assert!(!child.is_root());
    }

    #[test]
    fn set_only_parent_replaces() {
        let a = ContentRef::from_content(b"a");
        let b = ContentRef::from_content(b"b");
        let c = ContentRef::from_content(b"c");

        let mut snap = VersionSnapshot::new(ContentRef::from_content(b"s"), vec![a, b], log());
        snap.set_only_parent(c.clone());
        assert_eq!(snap.parents, vec![c]);
    }

    #[test]
    fn object_item_roundtrip() {
        let snap = VersionSnapshot::new(
            ContentRef::from_content(b"s"),
            vec![ContentRef::from_content(b"p")],
            log(),
        );
        let item = snap.to_object_item().unwrap();
        assert_eq!(item.reference, snap.hash);

        let parsed = VersionSnapshot::from_object_item(&item).unwrap();
        assert_eq!(parsed, snap);
    }

    #[test]
    fn corrupt_bytes_rejected() {
        let item = ObjectItem {
            reference: ContentRef::from_content(b"junk"),
            bytes: b"not json".to_vec(),
        };
        assert!(VersionSnapshot::from_object_item(&item).is_err());
    }
}
