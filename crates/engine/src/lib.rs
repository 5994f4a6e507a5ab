//! Inventory engine for Tally
//!
//! This crate turns a test tree into a classified, cached inventory:
//! - config: `tally.toml` loading and validation
//! - walk: Discovery of contributing source files
//! - fingerprint: Invalidation keys over path, size and mtime
//! - inventory: Immutable classified snapshots
//! - cache: Copy-on-write snapshot cache with per-file reuse and persistence
//! - reconcile: Static versus dynamic inventory comparison
//!
//! The cache is an explicit handle; nothing in this crate is global.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod config;
pub mod fingerprint;
pub mod inventory;
pub mod reconcile;
pub mod walk;

pub use cache::{BuildOutcome, BuildStats, InventoryCache};
pub use config::{
    CacheConfig, ExecutionConfig, HistoryConfig, IdentifierConfig, LayoutConfig, ScoringConfig,
    TallyConfig, CONFIG_FILE_NAME,
};
pub use inventory::{FileEntry, InventorySnapshot};
pub use reconcile::{
    parse_collect_output, verify, verify_with, CountDelta, DiscrepancyReport, DynamicRecord,
};
pub use walk::{FsWalker, SourceFile, SourceKind, SourceWalker};
