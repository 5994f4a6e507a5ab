//! Retry policy and exactly-once reporting

use crate::common::*;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tally::tally_engine::ExecutionConfig;
use tally::tally_executor::{
    BatchExecutor, BatchRequest, BatchRun, BatchState, CaseResult, ExecError, ExecResult,
};
use tally::{CaseOutcome, Scheduler, TestCaseId};

/// Times out every attempt of the batches containing `doomed`, passes
/// everything else, and counts attempts per batch
struct Scripted {
    doomed: TestCaseId,
    attempts: Mutex<HashMap<usize, u32>>,
}

impl Scripted {
    fn new(doomed: TestCaseId) -> Arc<Self> {
        Arc::new(Scripted {
            doomed,
            attempts: Mutex::new(HashMap::new()),
        })
    }
}

impl BatchExecutor for Scripted {
    fn execute(&self, request: &BatchRequest<'_>) -> ExecResult<BatchRun> {
        *self.attempts.lock().entry(request.index).or_insert(0) += 1;
        if request.ids.contains(&self.doomed) {
            return Err(ExecError::Timeout {
                timeout_ms: request.timeout.as_millis() as u64,
            });
        }
        Ok(BatchRun {
            results: request
                .ids
                .iter()
                .map(|id| CaseResult {
                    id: id.clone(),
                    outcome: CaseOutcome::Passed,
                    duration_ms: 2,
                })
                .collect(),
            elapsed_ms: 2 * request.ids.len() as u64,
            capture: None,
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn config(max_retries: u32) -> ExecutionConfig {
    ExecutionConfig {
        batch_size: 2,
        workers: 3,
        max_retries,
        timeout_ms: 50,
        ..ExecutionConfig::default()
    }
}

#[test]
fn always_timing_out_batch_reported_once_after_retries() {
    init_tracing();
    let ids = fixture_ids();
    let doomed = ids[2].clone();
    let executor = Scripted::new(doomed.clone());
    let scheduler = Scheduler::new(executor.clone(), config(2)).unwrap();

    let report = scheduler.run(&ids).unwrap();

    assert_eq!(report.len(), ids.len());
    let reported: Vec<TestCaseId> = report.results().map(|r| r.id.clone()).collect();
    assert_eq!(reported, ids);

    assert_eq!(report.failed_batches(), vec![1]);
    let batch = &report.batches()[1];
    assert_eq!(batch.state, BatchState::FailedAfterRetries);
    assert_eq!(batch.attempts, 3);
    assert!(matches!(batch.last_error, Some(ExecError::Timeout { .. })));
    assert_eq!(executor.attempts.lock()[&1], 3);
    assert_eq!(
        report.result(&doomed).unwrap().outcome,
        CaseOutcome::FailedAfterRetries
    );
    assert_eq!(report.counts()[&CaseOutcome::FailedAfterRetries], 2);
    assert_eq!(report.counts()[&CaseOutcome::Passed], ids.len() - 2);
}

#[test]
fn every_other_batch_attempted_once() {
    let ids = fixture_ids();
    let executor = Scripted::new(ids[0].clone());
    let scheduler = Scheduler::new(executor.clone(), config(1)).unwrap();
    scheduler.run(&ids).unwrap();

    let attempts = executor.attempts.lock();
    assert_eq!(attempts[&0], 2);
    for index in 1..4 {
        assert_eq!(attempts[&index], 1);
    }
}

#[test]
fn interrupted_run_resumes_from_journal() {
    let dir = tempfile::tempdir().unwrap();
    let journal = dir.path().join("state").join("run.journal");
    let ids = fixture_ids();

    // First run is cancelled up front: nothing executes, the journal stays.
    let executor = Scripted::new(TestCaseId::new("none"));
    let scheduler = Scheduler::new(executor.clone(), config(0))
        .unwrap()
        .with_journal(&journal);
    scheduler.cancel_token().cancel();
    let cancelled = scheduler.run(&ids).unwrap();
    assert!(cancelled.was_cancelled());
    assert_eq!(cancelled.counts()[&CaseOutcome::Cancelled], ids.len());
    assert!(executor.attempts.lock().is_empty());
    assert!(journal.exists());

    let scheduler = Scheduler::new(executor.clone(), config(0))
        .unwrap()
        .with_journal(&journal);
    let report = scheduler.run(&ids).unwrap();
    assert!(report.is_success());
    assert_eq!(report.resumed_batches(), 0);
    assert_eq!(executor.attempts.lock().len(), 4);
    assert!(!journal.exists());
}
