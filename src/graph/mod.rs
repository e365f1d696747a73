//! The component version graph: snapshots, ancestry, lanes, divergence
//! and the orchestrating [`VersionGraph`].
//!
//! [`VersionGraph`]: component::VersionGraph

pub mod component;
pub mod divergence;
pub mod errors;
pub mod history;
pub mod lane;
pub mod snapshot;

pub use component::{InsertOpts, VersionGraph};
pub use divergence::SnapsDistance;
pub use errors::GraphError;
