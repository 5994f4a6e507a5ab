//! Inventory integration tests.
//!
//! End-to-end checks over a real test tree on disk: static discovery and
//! classification, cache reuse and invalidation, and reconciliation against
//! the framework's collect-only output.

#[path = "../common/mod.rs"]
mod common;

mod cache;
mod classification;
mod reconciliation;
