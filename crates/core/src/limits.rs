//! Defaults and hard limits
//!
//! These constants are the defaults behind `tally.toml`. The ordinal base is
//! part of the identifier contract with the external framework and is covered
//! by reconciliation tests.

/// First ordinal assigned to a Scenario Outline example row.
///
/// pytest-bdd parametrizes example rows with zero-based ids
/// (`test_name[0]`, `test_name[1]`, ...).
pub const EXAMPLE_ORDINAL_BASE: usize = 0;

/// Number of history entries retained per test case (default: 10)
pub const DEFAULT_HISTORY_DEPTH: usize = 10;

/// Recency half-life, in history entries (default: 3)
pub const DEFAULT_HALF_LIFE: f64 = 3.0;

/// Tests per batch (default: 20)
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Concurrent executor invocations (default: 4)
pub const DEFAULT_WORKERS: usize = 4;

/// Per-batch deadline in milliseconds (default: 300s)
pub const DEFAULT_BATCH_TIMEOUT_MS: u64 = 300_000;

/// Retries after the first attempt (default: 2)
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Time in-flight batches get to finish after cancellation (default: 5s)
pub const DEFAULT_CANCEL_GRACE_MS: u64 = 5_000;

/// Longest stem used when a test identifier names a file on disk.
///
/// Identifiers of parametrized outlines regularly exceed the 255-byte
/// filename limit of common filesystems.
pub const MAX_FILE_STEM_LEN: usize = 96;

/// Default risk threshold for high-risk selection
pub const DEFAULT_RISK_THRESHOLD: f64 = 0.7;
