//! Object store seam: the async trait the graph core consumes, and the
//! in-memory implementation used by tests.

pub mod memory;
pub mod traits;

pub use traits::{ObjectItem, ObjectStore, StoreError};
