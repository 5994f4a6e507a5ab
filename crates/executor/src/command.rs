//! External executor seam and the subprocess implementation.
//!
//! [`CommandExecutor`] appends the batch identifiers to the configured
//! command, captures stdout and stderr to per-batch files, polls the child
//! until it exits, and reads per-test status lines back from stdout:
//!
//! ```text
//! tests/unit/test_db.py::test_insert PASSED          [ 50%]
//! FAILED tests/unit/test_db.py::test_delete - AssertionError
//! ```
//!
//! Both the verbose form (`<id> STATUS`) and the summary form
//! (`STATUS <id>`) are understood. When a test is reported more than once
//! (a teardown error after a pass, or a verbose line plus a summary line),
//! the most severe status wins.

use crate::cancel::CancelToken;
use crate::error::{ExecError, ExecResult};
use crate::report::{CaptureRef, CaseOutcome, CaseResult};
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tally_core::{Error, Result, TestCaseId};
use tally_engine::TallyConfig;
use tracing::{debug, warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// One attempt of one batch
#[derive(Debug, Clone, Copy)]
pub struct BatchRequest<'a> {
    /// Position in the plan
    pub index: usize,
    /// 1-based attempt number
    pub attempt: u32,
    /// Test cases in submission order
    pub ids: &'a [TestCaseId],
    /// Hard deadline of the attempt
    pub timeout: Duration,
    /// Run cancellation
    pub cancel: &'a CancelToken,
    /// Time the attempt may keep running after cancellation
    pub grace: Duration,
}

/// A finished attempt
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRun {
    /// Per-test results in submission order
    pub results: Vec<CaseResult>,
    /// Wall time of the attempt
    pub elapsed_ms: u64,
    /// Output capture, if any
    pub capture: Option<CaptureRef>,
}

/// Runs one batch attempt.
///
/// Implementations must be Send + Sync; attempts run on pool workers.
/// `Ok` means the executor ran to completion, whatever the tests did.
pub trait BatchExecutor: Send + Sync {
    /// Execute the attempt, honoring its deadline and cancellation
    fn execute(&self, request: &BatchRequest<'_>) -> ExecResult<BatchRun>;

    /// Name for debugging and logging
    fn name(&self) -> &str;
}

// ============================================================================
// CommandExecutor
// ============================================================================

/// Subprocess executor
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
    workdir: PathBuf,
    capture_dir: PathBuf,
    poll_interval: Duration,
}

impl CommandExecutor {
    /// Executor running `command` (program and leading arguments) in
    /// `workdir`, capturing output under `capture_dir`
    pub fn new(
        command: &[String],
        workdir: impl Into<PathBuf>,
        capture_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::invalid_config("executor command is empty"))?;
        Ok(CommandExecutor {
            program: program.clone(),
            args: args.to_vec(),
            workdir: workdir.into(),
            capture_dir: capture_dir.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Executor from `[execution]`, run from the inventory root
    pub fn from_config(config: &TallyConfig, root: &Path) -> Result<Self> {
        Self::new(&config.execution.command, root, config.capture_dir(root))
    }

    /// Builder: completion polling interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn capture_paths(&self, request: &BatchRequest<'_>) -> CaptureRef {
        let stem = match request.ids.first() {
            Some(first) => format!(
                "batch-{:04}-{}-{}",
                request.index,
                request.attempt,
                first.file_stem()
            ),
            None => format!("batch-{:04}-{}", request.index, request.attempt),
        };
        CaptureRef {
            stdout: self.capture_dir.join(format!("{}.out", stem)),
            stderr: self.capture_dir.join(format!("{}.err", stem)),
        }
    }

    fn spawn(&self, request: &BatchRequest<'_>, capture: &CaptureRef) -> ExecResult<Child> {
        fs::create_dir_all(&self.capture_dir).map_err(|e| {
            ExecError::launch(format!(
                "cannot create capture directory {}: {}",
                self.capture_dir.display(),
                e
            ))
        })?;
        let stdout = File::create(&capture.stdout)
            .map_err(|e| ExecError::launch(format!("cannot create stdout capture: {}", e)))?;
        let stderr = File::create(&capture.stderr)
            .map_err(|e| ExecError::launch(format!("cannot create stderr capture: {}", e)))?;

        Command::new(&self.program)
            .args(&self.args)
            .args(request.ids.iter().map(|id| id.as_str()))
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|e| ExecError::launch(format!("{}: {}", self.program, e)))
    }

    /// Wait for the child; kill it on deadline or expired cancellation grace
    fn wait(&self, child: &mut Child, request: &BatchRequest<'_>, started: Instant) -> ExecResult<()> {
        loop {
            match child.try_wait() {
                Ok(Some(_status)) => return Ok(()),
                Ok(None) => {}
                Err(e) => {
                    kill(child, request.index);
                    return Err(ExecError::launch(format!("cannot poll executor: {}", e)));
                }
            }
            if started.elapsed() >= request.timeout {
                kill(child, request.index);
                return Err(ExecError::Timeout {
                    timeout_ms: request.timeout.as_millis() as u64,
                });
            }
            if request.cancel.grace_expired(request.grace) {
                kill(child, request.index);
                return Err(ExecError::Cancelled);
            }
            std::thread::sleep(self.poll_interval);
        }
    }
}

fn kill(child: &mut Child, batch: usize) {
    if let Err(e) = child.kill() {
        debug!(target: "tally::exec", batch, error = %e, "Kill failed; child already exited");
    }
    let _ = child.wait();
}

impl BatchExecutor for CommandExecutor {
    fn execute(&self, request: &BatchRequest<'_>) -> ExecResult<BatchRun> {
        if request.cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }
        let capture = self.capture_paths(request);
        let started = Instant::now();
        let mut child = self.spawn(request, &capture)?;
        debug!(
            target: "tally::exec",
            batch = request.index,
            attempt = request.attempt,
            tests = request.ids.len(),
            pid = child.id(),
            "Executor started"
        );
        self.wait(&mut child, request, started)?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let output = match fs::read(&capture.stdout) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!(
                    target: "tally::exec",
                    batch = request.index,
                    path = %capture.stdout.display(),
                    error = %e,
                    "Cannot read captured output"
                );
                String::new()
            }
        };
        Ok(BatchRun {
            results: parse_results(&output, request.ids, elapsed_ms),
            elapsed_ms,
            capture: Some(capture),
        })
    }

    fn name(&self) -> &str {
        &self.program
    }
}

// ============================================================================
// Output parsing
// ============================================================================

fn severity(outcome: CaseOutcome) -> u8 {
    match outcome {
        CaseOutcome::Skipped => 0,
        CaseOutcome::Passed => 1,
        CaseOutcome::Failed => 2,
        _ => 3,
    }
}

/// Per-test results for `ids`, in submission order.
///
/// Tests never mentioned in `output` are `NotReported`. The batch wall time
/// is split evenly across the batch.
pub fn parse_results(output: &str, ids: &[TestCaseId], elapsed_ms: u64) -> Vec<CaseResult> {
    let wanted: HashMap<&str, usize> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let mut reported: Vec<Option<CaseOutcome>> = vec![None; ids.len()];

    for line in output.lines() {
        let mut tokens = line.split_whitespace();
        let (first, second) = match (tokens.next(), tokens.next()) {
            (Some(first), Some(second)) => (first, second),
            _ => continue,
        };
        let hit = match (CaseOutcome::from_status(first), CaseOutcome::from_status(second)) {
            (Some(outcome), _) => wanted.get(second).map(|&i| (i, outcome)),
            (None, Some(outcome)) => wanted.get(first).map(|&i| (i, outcome)),
            (None, None) => None,
        };
        if let Some((i, outcome)) = hit {
            let slot = &mut reported[i];
            if slot.map_or(true, |previous| severity(outcome) > severity(previous)) {
                *slot = Some(outcome);
            }
        }
    }

    let per_test = if ids.is_empty() {
        0
    } else {
        elapsed_ms / ids.len() as u64
    };
    ids.iter()
        .zip(reported)
        .map(|(id, outcome)| CaseResult {
            id: id.clone(),
            outcome: outcome.unwrap_or(CaseOutcome::NotReported),
            duration_ms: per_test,
        })
        .collect()
}
