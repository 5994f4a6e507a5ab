//! Durability layer for Tally
//!
//! This crate handles everything that touches disk:
//!
//! - framing: CRC-checked length-prefixed records
//! - log: Append-only record log with torn-tail recovery and atomic rewrite
//! - snapshot_file: Checksummed inventory snapshot files
//! - history: Bounded per-test execution history
//! - journal: Run journal for resuming interrupted runs

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod framing;
pub mod history;
pub mod journal;
pub mod log;
pub mod snapshot_file;

pub use error::{DurabilityError, DurabilityResult};
pub use history::{HistoryRecord, HistoryStore};
pub use journal::{plan_hash, RunJournal};
pub use log::{write_atomic, RecordLog, Recovered};
pub use snapshot_file::{read_snapshot, write_snapshot, StoredSnapshot};
