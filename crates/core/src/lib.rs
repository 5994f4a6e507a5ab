//! Core types for Tally
//!
//! This crate defines the vocabulary shared by every other layer:
//! - TestCaseId: Stable identifier of one runnable test case
//! - Category / Speed / Classification: Marker-derived test metadata
//! - Outcome / HistoryEntry: Execution history records
//! - CategoryLayout: Directory convention used to infer categories
//! - Diagnostic: Non-fatal findings (unparsable files, anomalies)
//! - Error: Error taxonomy shared across crates
//! - Timestamp: Microsecond wall-clock timestamps

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod layout;
pub mod limits;
pub mod timestamp;
pub mod types;

pub use error::{Error, Result};
pub use layout::CategoryLayout;
pub use timestamp::Timestamp;
pub use types::{
    Category, Classification, Diagnostic, DiagnosticKind, HistoryEntry, Outcome, Speed,
    TestCaseId,
};
