//! Execution batches and their state machine
//!
//! ```text
//! Pending ──► Running ──► Succeeded
//!               │
//!               ├──► TimedOut ────┐
//!               ├──► LaunchFailed ┤
//!               │                 ├──► Retrying ──► Running ...
//!               │                 └──► FailedAfterRetries
//!               └──► Cancelled ◄── Pending | Retrying
//! ```
//!
//! A batch is retried while its retry count is below `max_retries`, so it is
//! attempted at most `max_retries + 1` times.

use crate::error::ExecError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tally_core::{Error, Result, TestCaseId};

/// State of one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    /// Not yet submitted
    Pending,
    /// An attempt is in flight
    Running,
    /// The executor finished and reported
    Succeeded,
    /// The last attempt exceeded its deadline
    TimedOut,
    /// The last attempt could not start the executor
    LaunchFailed,
    /// Waiting for another attempt
    Retrying,
    /// Out of retries
    FailedAfterRetries,
    /// Stopped by run cancellation
    Cancelled,
}

impl BatchState {
    /// Whether the batch is finished
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchState::Succeeded | BatchState::FailedAfterRetries | BatchState::Cancelled
        )
    }

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchState::Pending => "pending",
            BatchState::Running => "running",
            BatchState::Succeeded => "succeeded",
            BatchState::TimedOut => "timed_out",
            BatchState::LaunchFailed => "launch_failed",
            BatchState::Retrying => "retrying",
            BatchState::FailedAfterRetries => "failed_after_retries",
            BatchState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for BatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered, size-bounded slice of the test set
#[derive(Debug, Clone)]
pub struct ExecutionBatch {
    index: usize,
    ids: Vec<TestCaseId>,
    timeout: Duration,
    attempts: u32,
    state: BatchState,
    last_error: Option<ExecError>,
}

impl ExecutionBatch {
    /// New pending batch
    pub fn new(index: usize, ids: Vec<TestCaseId>, timeout: Duration) -> Self {
        ExecutionBatch {
            index,
            ids,
            timeout,
            attempts: 0,
            state: BatchState::Pending,
            last_error: None,
        }
    }

    /// Position in the plan
    pub fn index(&self) -> usize {
        self.index
    }

    /// Test cases in submission order
    pub fn ids(&self) -> &[TestCaseId] {
        &self.ids
    }

    /// Per-attempt deadline
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Attempts started so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Retries started so far
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    /// Current state
    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Failure of the most recent failed attempt
    pub fn last_error(&self) -> Option<&ExecError> {
        self.last_error.as_ref()
    }

    /// Start an attempt; returns its 1-based number
    pub fn start(&mut self) -> Result<u32> {
        match self.state {
            BatchState::Pending | BatchState::Retrying => {
                self.attempts += 1;
                self.state = BatchState::Running;
                Ok(self.attempts)
            }
            other => Err(self.invalid("start", other)),
        }
    }

    /// The running attempt finished and reported
    pub fn succeed(&mut self) -> Result<()> {
        match self.state {
            BatchState::Running => {
                self.state = BatchState::Succeeded;
                Ok(())
            }
            other => Err(self.invalid("succeed", other)),
        }
    }

    /// The running attempt failed. Returns the state after the retry
    /// decision: `Retrying`, `FailedAfterRetries` or `Cancelled`.
    pub fn fail(&mut self, error: ExecError, max_retries: u32) -> Result<BatchState> {
        if self.state != BatchState::Running {
            return Err(self.invalid("fail", self.state));
        }
        self.state = match &error {
            ExecError::Cancelled => BatchState::Cancelled,
            ExecError::Timeout { .. } => BatchState::TimedOut,
            ExecError::Launch { .. } => BatchState::LaunchFailed,
        };
        self.last_error = Some(error);
        if self.state != BatchState::Cancelled {
            self.state = if self.retries() < max_retries {
                BatchState::Retrying
            } else {
                BatchState::FailedAfterRetries
            };
        }
        Ok(self.state)
    }

    /// Stop a batch that is not running
    pub fn cancel(&mut self) -> Result<()> {
        match self.state {
            BatchState::Pending | BatchState::Retrying => {
                self.state = BatchState::Cancelled;
                Ok(())
            }
            other => Err(self.invalid("cancel", other)),
        }
    }

    fn invalid(&self, action: &str, state: BatchState) -> Error {
        Error::internal(format!(
            "cannot {} batch {} in state {}",
            action, self.index, state
        ))
    }
}

/// Split `ids` into ordered batches of at most `batch_size` identifiers
pub fn partition(ids: &[TestCaseId], batch_size: usize, timeout: Duration) -> Vec<ExecutionBatch> {
    ids.chunks(batch_size.max(1))
        .enumerate()
        .map(|(index, chunk)| ExecutionBatch::new(index, chunk.to_vec(), timeout))
        .collect()
}
