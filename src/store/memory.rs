//! store::memory
//!
//! In-memory object store for deterministic testing.
//!
//! # Design
//!
//! `MemoryStore` stores objects and remote-head records in memory and
//! counts every `load` per ref, so tests can assert that concurrent
//! ancestry population does not issue duplicate loads. A single ref can
//! be configured to fail with an IO error to exercise error paths.
//!
//! # Example
//!
//! ```
//! use strata::store::memory::MemoryStore;
//! use strata::store::{ObjectItem, ObjectStore};
//! use strata::core::types::ContentRef;
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new();
//! let reference = ContentRef::from_content(b"snapshot");
//! store.seed(ObjectItem { reference: reference.clone(), bytes: b"snapshot".to_vec() });
//!
//! let item = store.load(&reference).await.unwrap().unwrap();
//! assert_eq!(item.bytes, b"snapshot");
//! assert_eq!(store.load_count(&reference), 1);
//! # });
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::traits::{ObjectItem, ObjectStore, StoreError};
use crate::core::types::{ComponentKey, ContentRef, LaneRef};

/// In-memory object store.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    /// Stored objects by ref.
    objects: HashMap<ContentRef, Vec<u8>>,
    /// Remote heads by (lane, component).
    remote_heads: HashMap<(LaneRef, ComponentKey), ContentRef>,
    /// Per-ref load counts (single loads only).
    load_counts: HashMap<ContentRef, usize>,
    /// Ref that fails every load with an IO error.
    fail_load_of: Option<ContentRef>,
    /// Number of write_all calls.
    write_calls: usize,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object.
    pub fn seed(&self, item: ObjectItem) {
        let mut inner = self.inner.lock().unwrap();
        inner.objects.insert(item.reference, item.bytes);
    }

    /// Seed many objects.
    pub fn seed_all(&self, items: Vec<ObjectItem>) {
        let mut inner = self.inner.lock().unwrap();
        for item in items {
            inner.objects.insert(item.reference, item.bytes);
        }
    }

    /// Remove an object, simulating a partially-fetched store.
    pub fn remove(&self, reference: &ContentRef) {
        let mut inner = self.inner.lock().unwrap();
        inner.objects.remove(reference);
    }

    /// Record a remote head for a component on a lane.
    pub fn set_remote_head(&self, lane: LaneRef, component: ComponentKey, head: ContentRef) {
        let mut inner = self.inner.lock().unwrap();
        inner.remote_heads.insert((lane, component), head);
    }

    /// Configure a ref whose loads fail with an IO error.
    pub fn fail_load_of(&self, reference: ContentRef) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_load_of = Some(reference);
    }

    /// How many times `load` was called for a ref.
    pub fn load_count(&self, reference: &ContentRef) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.load_counts.get(reference).copied().unwrap_or(0)
    }

    /// Total `load` calls across all refs.
    pub fn total_loads(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.load_counts.values().sum()
    }

    /// How many `write_all` calls were made.
    pub fn write_calls(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.write_calls
    }

    /// Whether an object exists (for test verification).
    pub fn contains(&self, reference: &ContentRef) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.objects.contains_key(reference)
    }

    /// Raw bytes of a stored object (for test verification).
    pub fn bytes_of(&self, reference: &ContentRef) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner.objects.get(reference).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn load(&self, reference: &ContentRef) -> Result<Option<ObjectItem>, StoreError> {
        // Yield first so concurrent callers genuinely interleave in tests.
        tokio::task::yield_now().await;
        let mut inner = self.inner.lock().unwrap();
        *inner.load_counts.entry(reference.clone()).or_insert(0) += 1;
        if inner.fail_load_of.as_ref() == Some(reference) {
            return Err(StoreError::Io(format!("injected failure loading {reference}")));
        }
        Ok(inner.objects.get(reference).map(|bytes| ObjectItem {
            reference: reference.clone(),
            bytes: bytes.clone(),
        }))
    }

    async fn load_many(&self, refs: &[ContentRef]) -> Result<Vec<ObjectItem>, StoreError> {
        let mut items = Vec::with_capacity(refs.len());
        for reference in refs {
            match self.load(reference).await? {
                Some(item) => items.push(item),
                None => {
                    return Err(StoreError::MissingObjectFile {
                        reference: reference.clone(),
                    })
                }
            }
        }
        Ok(items)
    }

    async fn load_many_ignore_missing(
        &self,
        refs: &[ContentRef],
    ) -> Result<Vec<ObjectItem>, StoreError> {
        let mut items = Vec::with_capacity(refs.len());
        for reference in refs {
            if let Some(item) = self.load(reference).await? {
                items.push(item);
            }
        }
        Ok(items)
    }

    async fn write_all(&self, objects: Vec<ObjectItem>) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        let mut inner = self.inner.lock().unwrap();
        inner.write_calls += 1;
        for item in objects {
            inner.objects.insert(item.reference, item.bytes);
        }
        Ok(())
    }

    async fn remote_head_for(
        &self,
        lane: &LaneRef,
        component: &ComponentKey,
    ) -> Result<Option<ContentRef>, StoreError> {
        tokio::task::yield_now().await;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .remote_heads
            .get(&(lane.clone(), component.clone()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(bytes: &[u8]) -> ObjectItem {
        ObjectItem {
            reference: ContentRef::from_content(bytes),
            bytes: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn load_counts_are_tracked() {
        let store = MemoryStore::new();
        let a = item(b"a");
        store.seed(a.clone());

        store.load(&a.reference).await.unwrap();
        store.load(&a.reference).await.unwrap();
        assert_eq!(store.load_count(&a.reference), 2);
    }

    #[tokio::test]
    async fn load_absent_is_none_not_error() {
        let store = MemoryStore::new();
        let missing = ContentRef::from_content(b"missing");
        assert!(store.load(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_many_fails_on_missing() {
        let store = MemoryStore::new();
        let a = item(b"a");
        let missing = ContentRef::from_content(b"missing");
        store.seed(a.clone());

        let err = store
            .load_many(&[a.reference.clone(), missing.clone()])
            .await
            .unwrap_err();
        match err {
            StoreError::MissingObjectFile { reference } => assert_eq!(reference, missing),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn load_many_ignore_missing_skips() {
        let store = MemoryStore::new();
        let a = item(b"a");
        let missing = ContentRef::from_content(b"missing");
        store.seed(a.clone());

        let items = store
            .load_many_ignore_missing(&[a.reference.clone(), missing])
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0], a);
    }

    #[tokio::test]
    async fn fail_injection() {
        let store = MemoryStore::new();
        let a = item(b"a");
        store.seed(a.clone());
        store.fail_load_of(a.reference.clone());

        let err = store.load(&a.reference).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }

    #[tokio::test]
    async fn remote_heads() {
        let store = MemoryStore::new();
        let lane = LaneRef::default_lane("acme").unwrap();
        let key = ComponentKey::new("acme", "button").unwrap();
        let head = ContentRef::from_content(b"head");

        assert!(store
            .remote_head_for(&lane, &key)
            .await
            .unwrap()
            .is_none());

        store.set_remote_head(lane.clone(), key.clone(), head.clone());
        assert_eq!(store.remote_head_for(&lane, &key).await.unwrap(), Some(head));
    }
}
