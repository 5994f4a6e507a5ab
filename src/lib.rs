//! Tally - test inventory and execution orchestration
//!
//! Tally statically discovers every test case of a pytest / pytest-bdd
//! tree (including the cases Gherkin example tables expand to at run time),
//! classifies and caches them, ranks them by failure risk, and runs them in
//! bounded, retried batches through the external test executor.
//!
//! # Quick Start
//!
//! ```ignore
//! use tally::Tally;
//!
//! let tally = Tally::open("path/to/project")?;
//! let inventory = tally.inventory()?;
//! let ranked = tally.rank(&inventory, None)?;
//! let report = tally.run(&tally.prioritize(&ranked))?;
//! ```
//!
//! # Architecture
//!
//! [`Tally`] wires the layers together for one project root. Each layer is
//! also re-exported under its crate name for direct use.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod session;

pub use session::Tally;

pub use tally_classify;
pub use tally_core;
pub use tally_durability;
pub use tally_engine;
pub use tally_executor;
pub use tally_risk;
pub use tally_spec;

pub use tally_core::{
    Category, Classification, Diagnostic, DiagnosticKind, Error, HistoryEntry, Outcome, Result,
    Speed, TestCaseId,
};
pub use tally_engine::{DiscrepancyReport, InventoryCache, InventorySnapshot, TallyConfig};
pub use tally_executor::{AggregatedReport, CaseOutcome, ReportRecord, Scheduler};
pub use tally_risk::{ChurnProvider, RiskScorer};
