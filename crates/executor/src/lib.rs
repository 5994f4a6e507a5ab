//! Batch execution for Tally
//!
//! Runs a test set through an external test executor:
//! - batch: Execution batches and their retry state machine
//! - pool: Fixed-size worker pool
//! - command: `BatchExecutor` seam and the subprocess executor
//! - cancel: Run-level cancellation
//! - scheduler: Batching, dispatch, retries and journal resumption
//! - report: Per-test results, aggregation and structured records
//!
//! The engine never runs test bodies itself; every attempt is delegated to
//! a [`BatchExecutor`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod cancel;
pub mod command;
pub mod error;
pub mod pool;
pub mod report;
pub mod scheduler;

pub use batch::{partition, BatchState, ExecutionBatch};
pub use cancel::CancelToken;
pub use command::{parse_results, BatchExecutor, BatchRequest, BatchRun, CommandExecutor};
pub use error::{ExecError, ExecResult};
pub use pool::{PoolClosed, WorkerPool};
pub use report::{
    records_to_json, AggregatedReport, BatchReport, CaptureRef, CaseOutcome, CaseResult,
    ReportRecord,
};
pub use scheduler::Scheduler;
