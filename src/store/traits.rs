//! store::traits
//!
//! Object store trait definition.
//!
//! # Design
//!
//! The `ObjectStore` trait is async because store operations involve I/O
//! (filesystem or network, depending on the implementation). The graph
//! core consumes the store through this narrow seam only; it never
//! reaches for an ambient/global repository handle.
//!
//! Semantics the graph core relies on:
//!
//! - `load` never fails for "not found" - it returns `Ok(None)`.
//! - `load_many` treats a missing object as an IO-level failure
//!   ([`StoreError::MissingObjectFile`]), distinct from `load`'s absent.
//! - `load_many_ignore_missing` silently skips absent objects; used for
//!   optional auxiliary data.
//! - `write_all` persists a batch; the graph core funnels each
//!   ancestry-index update through a single `write_all` call so readers
//!   never observe a half-written index from that run.

use async_trait::async_trait;
use thiserror::Error;

use crate::core::types::{ComponentKey, ContentRef, LaneRef};

/// Errors from object store operations.
///
/// IO-level errors propagate through the graph core as-is; nothing in
/// the core retries them.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Underlying I/O failure (timeout, permission, transport).
    #[error("object store i/o error: {0}")]
    Io(String),

    /// A bulk load referenced an object whose backing file is missing.
    #[error("missing object file for {reference}")]
    MissingObjectFile {
        /// The ref whose object could not be read.
        reference: ContentRef,
    },

    /// An object was read but its bytes are not parseable.
    #[error("corrupt object {reference}: {message}")]
    Corrupt {
        /// The ref of the corrupt object.
        reference: ContentRef,
        /// What failed to parse.
        message: String,
    },
}

/// A raw object as stored: its ref and serialized bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectItem {
    /// The content ref this object is stored under.
    pub reference: ContentRef,
    /// Serialized object bytes.
    pub bytes: Vec<u8>,
}

/// Async key-value store keyed by [`ContentRef`].
///
/// Shared and safe for concurrent reads across different components.
/// Writes performed by the graph core are scoped to one component's
/// ancestry index and serialized by the per-graph population guard.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Load a single object.
    ///
    /// Returns `Ok(None)` when the ref has no object; never errors for
    /// "not found".
    async fn load(&self, reference: &ContentRef) -> Result<Option<ObjectItem>, StoreError>;

    /// Load a batch of objects, failing on the first missing one.
    ///
    /// # Errors
    ///
    /// [`StoreError::MissingObjectFile`] if any ref has no object.
    async fn load_many(&self, refs: &[ContentRef]) -> Result<Vec<ObjectItem>, StoreError>;

    /// Load a batch of objects, skipping missing ones.
    async fn load_many_ignore_missing(
        &self,
        refs: &[ContentRef],
    ) -> Result<Vec<ObjectItem>, StoreError>;

    /// Persist a batch of objects.
    async fn write_all(&self, objects: Vec<ObjectItem>) -> Result<(), StoreError>;

    /// The recorded remote head of a component on a lane, if any.
    ///
    /// This is the locally-cached knowledge of remote state (updated by
    /// fetch/import flows outside this crate), not a network call.
    async fn remote_head_for(
        &self,
        lane: &LaneRef,
        component: &ComponentKey,
    ) -> Result<Option<ContentRef>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display() {
        let err = StoreError::Io("connection reset".into());
        assert!(err.to_string().contains("connection reset"));

        let reference = ContentRef::from_content(b"x");
        let err = StoreError::MissingObjectFile {
            reference: reference.clone(),
        };
        assert!(err.to_string().contains(reference.as_str()));

        let err = StoreError::Corrupt {
            reference,
            message: "unexpected eof".into(),
        };
        assert!(err.to_string().contains("unexpected eof"));
    }
}
