//! Foundational domain types shared across the crate.

pub mod types;
