//! Batch results and the aggregated run report
//!
//! Every identifier of a run appears exactly once in its report, in
//! submission order. [`ReportRecord`] is the field-stable serialized form.

use crate::batch::BatchState;
use crate::error::ExecError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tally_core::{Category, HistoryEntry, Outcome, Result, Speed, TestCaseId, Timestamp};
use tally_engine::InventorySnapshot;

/// Final outcome of one test case in one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseOutcome {
    /// Reported passed
    Passed,
    /// Reported failed
    Failed,
    /// Reported error (fixture, setup, teardown)
    Error,
    /// Reported skipped
    Skipped,
    /// The executor finished without reporting this test
    NotReported,
    /// The batch timed out or failed to launch on every attempt
    FailedAfterRetries,
    /// The run was cancelled before the test finished
    Cancelled,
}

impl CaseOutcome {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseOutcome::Passed => "passed",
            CaseOutcome::Failed => "failed",
            CaseOutcome::Error => "error",
            CaseOutcome::Skipped => "skipped",
            CaseOutcome::NotReported => "not_reported",
            CaseOutcome::FailedAfterRetries => "failed_after_retries",
            CaseOutcome::Cancelled => "cancelled",
        }
    }

    /// Parse an executor status word (`PASSED`, `FAILED`, `ERROR`, `SKIPPED`)
    pub fn from_status(word: &str) -> Option<Self> {
        match word {
            "PASSED" => Some(CaseOutcome::Passed),
            "FAILED" => Some(CaseOutcome::Failed),
            "ERROR" => Some(CaseOutcome::Error),
            "SKIPPED" => Some(CaseOutcome::Skipped),
            _ => None,
        }
    }

    /// Whether the outcome does not count against the run
    pub fn is_ok(&self) -> bool {
        matches!(self, CaseOutcome::Passed | CaseOutcome::Skipped)
    }
}

/// Result of one test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseResult {
    /// Test case
    pub id: TestCaseId,
    /// Final outcome
    pub outcome: CaseOutcome,
    /// Wall time attributed to the test
    pub duration_ms: u64,
}

/// Where a batch attempt's output was captured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRef {
    /// Captured standard output
    pub stdout: PathBuf,
    /// Captured standard error
    pub stderr: PathBuf,
}

/// Terminal result of one batch; also the run journal record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Position in the plan
    pub index: usize,
    /// Terminal state
    pub state: BatchState,
    /// Attempts made
    pub attempts: u32,
    /// Wall time of the last attempt
    pub elapsed_ms: u64,
    /// Output capture of the last attempt that started the executor
    pub capture: Option<CaptureRef>,
    /// Failure of the last failed attempt
    pub last_error: Option<ExecError>,
    /// Per-test results in submission order
    pub results: Vec<CaseResult>,
}

impl BatchReport {
    /// Every test of a batch with the same outcome
    pub fn uniform(
        index: usize,
        state: BatchState,
        attempts: u32,
        ids: &[TestCaseId],
        outcome: CaseOutcome,
        last_error: Option<ExecError>,
    ) -> Self {
        BatchReport {
            index,
            state,
            attempts,
            elapsed_ms: 0,
            capture: None,
            last_error,
            results: ids
                .iter()
                .map(|id| CaseResult {
                    id: id.clone(),
                    outcome,
                    duration_ms: 0,
                })
                .collect(),
        }
    }

    /// History entries for the results that came from a real execution.
    ///
    /// Skipped, unreported and cancelled tests are not recorded; neither are
    /// batches that never got the executor started.
    pub fn history_entries(&self, at: Timestamp) -> Vec<(&TestCaseId, HistoryEntry)> {
        self.results
            .iter()
            .filter_map(|r| {
                let outcome = match r.outcome {
                    CaseOutcome::Passed => Outcome::Pass,
                    CaseOutcome::Failed => Outcome::Fail,
                    CaseOutcome::Error => Outcome::Error,
                    CaseOutcome::FailedAfterRetries => match self.last_error {
                        Some(ExecError::Timeout { .. }) => Outcome::Timeout,
                        _ => return None,
                    },
                    CaseOutcome::Skipped | CaseOutcome::NotReported | CaseOutcome::Cancelled => {
                        return None
                    }
                };
                Some((
                    &r.id,
                    HistoryEntry {
                        outcome,
                        duration_ms: r.duration_ms,
                        at,
                    },
                ))
            })
            .collect()
    }
}

// ============================================================================
// AggregatedReport
// ============================================================================

/// Report of one run, keyed by test case
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregatedReport {
    batches: Vec<BatchReport>,
    elapsed_ms: u64,
    resumed_batches: usize,
    cancelled: bool,
    /// Test case -> (batch position, result position)
    #[serde(skip)]
    index: HashMap<TestCaseId, (usize, usize)>,
}

impl AggregatedReport {
    /// Assemble from terminal batch reports (any order)
    pub fn new(mut batches: Vec<BatchReport>, elapsed_ms: u64, resumed_batches: usize) -> Self {
        batches.sort_by_key(|b| b.index);
        let cancelled = batches.iter().any(|b| b.state == BatchState::Cancelled);
        let mut index = HashMap::new();
        for (b, batch) in batches.iter().enumerate() {
            for (r, result) in batch.results.iter().enumerate() {
                index.entry(result.id.clone()).or_insert((b, r));
            }
        }
        AggregatedReport {
            batches,
            elapsed_ms,
            resumed_batches,
            cancelled,
            index,
        }
    }

    /// Batch reports in plan order
    pub fn batches(&self) -> &[BatchReport] {
        &self.batches
    }

    /// Results in submission order
    pub fn results(&self) -> impl Iterator<Item = &CaseResult> {
        self.batches.iter().flat_map(|b| b.results.iter())
    }

    /// Result of one test case
    pub fn result(&self, id: &TestCaseId) -> Option<&CaseResult> {
        let &(batch, position) = self.index.get(id)?;
        self.batches.get(batch)?.results.get(position)
    }

    /// Number of test cases
    pub fn len(&self) -> usize {
        self.batches.iter().map(|b| b.results.len()).sum()
    }

    /// Whether the run had no test cases
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wall time of the run
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    /// Batches restored from a run journal instead of executed
    pub fn resumed_batches(&self) -> usize {
        self.resumed_batches
    }

    /// Whether any batch was cancelled
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Test cases per outcome
    pub fn counts(&self) -> BTreeMap<CaseOutcome, usize> {
        let mut counts = BTreeMap::new();
        for result in self.results() {
            *counts.entry(result.outcome).or_insert(0) += 1;
        }
        counts
    }

    /// Indices of batches that ran out of retries
    pub fn failed_batches(&self) -> Vec<usize> {
        self.batches
            .iter()
            .filter(|b| b.state == BatchState::FailedAfterRetries)
            .map(|b| b.index)
            .collect()
    }

    /// Whether every test passed or was skipped
    pub fn is_success(&self) -> bool {
        self.results().all(|r| r.outcome.is_ok())
    }

    /// Serializable records, joined with classification and risk score
    pub fn records(
        &self,
        inventory: &InventorySnapshot,
        scores: &[(TestCaseId, f64)],
    ) -> Vec<ReportRecord> {
        let scores: HashMap<&TestCaseId, f64> = scores.iter().map(|(id, s)| (id, *s)).collect();
        self.results()
            .map(|r| {
                let classification = inventory.classification(&r.id);
                ReportRecord {
                    identifier: r.id.as_str().to_string(),
                    category: classification.map(|c| c.category),
                    speed: classification.map(|c| c.speed),
                    outcome: r.outcome,
                    duration_ms: r.duration_ms,
                    score: scores.get(&r.id).copied(),
                }
            })
            .collect()
    }
}

/// One line of the structured report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    /// Test case identifier
    pub identifier: String,
    /// Category, when the test is in the inventory
    pub category: Option<Category>,
    /// Speed, when the test is in the inventory
    pub speed: Option<Speed>,
    /// Final outcome
    pub outcome: CaseOutcome,
    /// Wall time attributed to the test
    pub duration_ms: u64,
    /// Risk score, when the test was scored
    pub score: Option<f64>,
}

/// Render records as a JSON array
pub fn records_to_json(records: &[ReportRecord]) -> Result<String> {
    serde_json::to_string_pretty(records)
        .map_err(|e| tally_core::Error::serialization(e.to_string()))
}
