//! Batch scheduler
//!
//! `run` partitions the test set into ordered batches, dispatches attempts
//! to a worker pool, drives each batch's state machine from the results, and
//! aggregates terminal batches into one report. The scheduling thread owns
//! every batch; workers only see an attempt's inputs.
//!
//! Finished batches are journaled. A run whose journal holds records for
//! the same plan only executes the batches that are missing. The journal is
//! deleted when a run completes without cancellation.
//!
//! Cancellation is per run: [`Scheduler::cancel_token`] hands out the token
//! of the current (or next) run. Once a cancelled run returns, the scheduler
//! installs a fresh token, so later runs execute normally.

use crate::batch::{partition, BatchState, ExecutionBatch};
use crate::cancel::CancelToken;
use crate::command::{BatchExecutor, BatchRequest, BatchRun, CommandExecutor};
use crate::error::{ExecError, ExecResult};
use crate::pool::WorkerPool;
use crate::report::{AggregatedReport, BatchReport, CaseOutcome, CaseResult};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tally_core::{Error, Result, TestCaseId, Timestamp};
use tally_durability::{plan_hash, HistoryStore, RunJournal};
use tally_engine::{ExecutionConfig, TallyConfig};
use tracing::{debug, info, warn};

type AttemptResult = (usize, ExecResult<BatchRun>);

/// Runs test sets through a [`BatchExecutor`]
pub struct Scheduler {
    executor: Arc<dyn BatchExecutor>,
    config: ExecutionConfig,
    history: Option<Arc<HistoryStore>>,
    journal: Option<PathBuf>,
    cancel: Mutex<CancelToken>,
}

impl Scheduler {
    /// Scheduler with validated execution settings
    pub fn new(executor: Arc<dyn BatchExecutor>, config: ExecutionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Scheduler {
            executor,
            config,
            history: None,
            journal: None,
            cancel: Mutex::new(CancelToken::new()),
        })
    }

    /// Subprocess scheduler for the inventory at `root`, journaling under
    /// the state directory
    pub fn from_config(config: &TallyConfig, root: &Path) -> Result<Self> {
        let executor = CommandExecutor::from_config(config, root)?;
        Ok(Self::new(Arc::new(executor), config.execution.clone())?
            .with_journal(config.journal_path(root)))
    }

    /// Builder: append outcomes to a history store
    pub fn with_history(mut self, history: Arc<HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    /// Builder: journal finished batches at `path`
    pub fn with_journal(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal = Some(path.into());
        self
    }

    /// Token of the run in progress, or of the next run when idle
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.lock().clone()
    }

    /// Execution settings
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Execute `tests` in order and report every one of them exactly once.
    ///
    /// Duplicate identifiers are run once, at their first position.
    pub fn run(&self, tests: &[TestCaseId]) -> Result<AggregatedReport> {
        let cancel = self.cancel_token();
        let result = self.run_with(tests, &cancel);
        if cancel.is_cancelled() {
            let mut current = self.cancel.lock();
            if current.is_cancelled() {
                *current = CancelToken::new();
            }
        }
        result
    }

    fn run_with(&self, tests: &[TestCaseId], cancel: &CancelToken) -> Result<AggregatedReport> {
        let started = Instant::now();
        let mut seen = HashSet::new();
        let tests: Vec<TestCaseId> = tests
            .iter()
            .filter(|id| seen.insert(*id))
            .cloned()
            .collect();

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let mut batches = partition(&tests, self.config.batch_size, timeout);
        if batches.is_empty() {
            return Ok(AggregatedReport::default());
        }

        let mut journal = match &self.journal {
            Some(path) => {
                let plan: Vec<Vec<TestCaseId>> = batches.iter().map(|b| b.ids().to_vec()).collect();
                Some(RunJournal::<BatchReport>::open(path, plan_hash(&plan))?)
            }
            None => None,
        };

        let mut finished: Vec<BatchReport> = Vec::with_capacity(batches.len());
        let mut done = vec![false; batches.len()];
        if let Some(journal) = journal.as_mut() {
            for report in journal.take_recovered() {
                if restores(&batches, &done, &report) {
                    done[report.index] = true;
                    finished.push(report);
                } else {
                    warn!(
                        target: "tally::exec",
                        batch = report.index,
                        "Ignoring journal record that does not match the plan"
                    );
                }
            }
        }
        let resumed = finished.len();
        let remaining: Vec<usize> = (0..batches.len()).filter(|&i| !done[i]).collect();

        info!(
            target: "tally::exec",
            tests = tests.len(),
            batches = batches.len(),
            resumed,
            workers = self.config.workers,
            executor = self.executor.name(),
            started_at = %Timestamp::now().to_rfc3339(),
            "Starting run"
        );

        if !remaining.is_empty() {
            let pool = WorkerPool::new(self.config.workers.min(remaining.len()))?;
            let (tx, rx) = mpsc::channel::<AttemptResult>();
            let mut outstanding = 0usize;

            for &i in &remaining {
                let batch = &mut batches[i];
                if cancel.is_cancelled() {
                    batch.cancel()?;
                    finished.push(cancelled(batch));
                } else {
                    self.dispatch(&pool, batch, cancel, &tx)?;
                    outstanding += 1;
                }
            }

            while outstanding > 0 {
                let (index, result) = rx
                    .recv()
                    .map_err(|_| Error::internal("worker result channel closed"))?;
                outstanding -= 1;
                let batch = &mut batches[index];

                let report = match result {
                    Ok(run) => {
                        batch.succeed()?;
                        Some(BatchReport {
                            index,
                            state: BatchState::Succeeded,
                            attempts: batch.attempts(),
                            elapsed_ms: run.elapsed_ms,
                            capture: run.capture,
                            last_error: batch.last_error().cloned(),
                            results: align_results(index, batch.ids(), run.results),
                        })
                    }
                    Err(error) => {
                        if error != ExecError::Cancelled {
                            warn!(
                                target: "tally::exec",
                                batch = index,
                                attempt = batch.attempts(),
                                error = %error,
                                "Batch attempt failed"
                            );
                        }
                        match batch.fail(error, self.config.max_retries)? {
                            BatchState::Retrying if cancel.is_cancelled() => {
                                batch.cancel()?;
                                Some(cancelled(batch))
                            }
                            BatchState::Retrying => {
                                debug!(
                                    target: "tally::exec",
                                    batch = index,
                                    retry = batch.attempts(),
                                    max_retries = self.config.max_retries,
                                    "Retrying batch"
                                );
                                self.dispatch(&pool, batch, cancel, &tx)?;
                                outstanding += 1;
                                None
                            }
                            BatchState::Cancelled => Some(cancelled(batch)),
                            _ => Some(BatchReport::uniform(
                                index,
                                BatchState::FailedAfterRetries,
                                batch.attempts(),
                                batch.ids(),
                                CaseOutcome::FailedAfterRetries,
                                batch.last_error().cloned(),
                            )),
                        }
                    }
                };

                if let Some(report) = report {
                    self.record(&report, journal.as_ref());
                    finished.push(report);
                }
            }
        }

        let report = AggregatedReport::new(finished, started.elapsed().as_millis() as u64, resumed);
        if let Some(journal) = journal {
            if report.was_cancelled() {
                info!(target: "tally::exec", "Run cancelled; journal kept for resumption");
            } else if let Err(e) = journal.complete() {
                warn!(target: "tally::exec", error = %e, "Failed to remove run journal");
            }
        }

        info!(
            target: "tally::exec",
            tests = report.len(),
            failed_batches = report.failed_batches().len(),
            cancelled = report.was_cancelled(),
            elapsed_ms = report.elapsed_ms(),
            "Run finished"
        );
        Ok(report)
    }

    fn dispatch(
        &self,
        pool: &WorkerPool,
        batch: &mut ExecutionBatch,
        cancel: &CancelToken,
        tx: &Sender<AttemptResult>,
    ) -> Result<()> {
        let attempt = batch.start()?;
        let index = batch.index();
        let ids = batch.ids().to_vec();
        let timeout = batch.timeout();
        let grace = Duration::from_millis(self.config.cancel_grace_ms);
        let executor = Arc::clone(&self.executor);
        let cancel = cancel.clone();
        let tx = tx.clone();

        pool.submit(move || {
            let result = if cancel.is_cancelled() {
                Err(ExecError::Cancelled)
            } else {
                let request = BatchRequest {
                    index,
                    attempt,
                    ids: &ids,
                    timeout,
                    cancel: &cancel,
                    grace,
                };
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    executor.execute(&request)
                }))
                .unwrap_or_else(|_| {
                    Err(ExecError::launch(format!("executor {} panicked", executor.name())))
                })
            };
            let _ = tx.send((index, result));
        })
        .map_err(|e| Error::internal(e.to_string()))
    }

    /// Journal a terminal batch and append its outcomes to history.
    /// Cancelled batches are left out so that a resumed run executes them.
    fn record(&self, report: &BatchReport, journal: Option<&RunJournal<BatchReport>>) {
        if report.state == BatchState::Cancelled {
            return;
        }
        if let Some(journal) = journal {
            if let Err(e) = journal.record(report) {
                warn!(target: "tally::exec", batch = report.index, error = %e, "Failed to journal batch");
            }
        }
        if let Some(history) = &self.history {
            if let Err(e) = history.append_many(report.history_entries(Timestamp::now())) {
                warn!(target: "tally::exec", batch = report.index, error = %e, "Failed to append history");
            }
        }
    }
}

fn cancelled(batch: &ExecutionBatch) -> BatchReport {
    BatchReport::uniform(
        batch.index(),
        BatchState::Cancelled,
        batch.attempts(),
        batch.ids(),
        CaseOutcome::Cancelled,
        batch.last_error().cloned(),
    )
}

/// One result per submitted identifier, in submission order.
///
/// Executors are external code: identifiers they leave out become
/// `NotReported`, and duplicates or identifiers outside the batch are dropped.
fn align_results(index: usize, ids: &[TestCaseId], results: Vec<CaseResult>) -> Vec<CaseResult> {
    let returned = results.len();
    let mut by_id: HashMap<TestCaseId, CaseResult> = HashMap::with_capacity(returned);
    for result in results {
        by_id.entry(result.id.clone()).or_insert(result);
    }
    let mut missing = 0usize;
    let mut aligned = Vec::with_capacity(ids.len());
    for id in ids {
        match by_id.remove(id) {
            Some(result) => aligned.push(result),
            None => {
                missing += 1;
                aligned.push(CaseResult {
                    id: id.clone(),
                    outcome: CaseOutcome::NotReported,
                    duration_ms: 0,
                });
            }
        }
    }
    if missing > 0 || returned != ids.len() {
        warn!(
            target: "tally::exec",
            batch = index,
            expected = ids.len(),
            returned,
            missing,
            "Executor results do not match the batch"
        );
    }
    aligned
}

/// Whether a journal record stands for a batch of this plan
fn restores(batches: &[ExecutionBatch], done: &[bool], report: &BatchReport) -> bool {
    match batches.get(report.index) {
        Some(batch) => {
            !done[report.index]
                && report.state.is_terminal()
                && report.results.iter().map(|r| &r.id).eq(batch.ids().iter())
        }
        None => false,
    }
}
