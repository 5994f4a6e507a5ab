//! Inventory, ranking and subprocess execution against a fixture project

#![cfg(unix)]

use crate::common::*;
use tally::tally_executor::records_to_json;
use tally::{CaseOutcome, Outcome, Tally, TallyConfig};

/// Reports every identifier as passed except the bad-password rows
const FAKE_RUNNER: &str = r#"for id in "$@"; do
  case "$id" in
    *bad_password*) echo "FAILED $id - AssertionError" ;;
    *) echo "$id PASSED" ;;
  esac
done
echo "runner finished" >&2
"#;

fn config() -> TallyConfig {
    let mut config = memory_config();
    config.execution.command = vec![
        "sh".to_string(),
        "-c".to_string(),
        FAKE_RUNNER.to_string(),
        "runner".to_string(),
    ];
    config.execution.batch_size = 3;
    config.execution.workers = 2;
    config.execution.timeout_ms = 10_000;
    config
}

#[test]
fn full_run_reports_every_test_once() {
    let dir = project();
    let tally = Tally::with_config(dir.path(), config()).unwrap();
    let inventory = tally.inventory().unwrap();
    let ids: Vec<_> = inventory.ids().cloned().collect();
    assert_eq!(ids, fixture_ids());

    let report = tally.run(&ids).unwrap();
    assert_eq!(report.len(), 7);
    assert_eq!(report.batches().len(), 3);
    assert!(!report.was_cancelled());
    assert!(!report.is_success());

    let counts = report.counts();
    assert_eq!(counts.get(&CaseOutcome::Passed), Some(&4));
    assert_eq!(counts.get(&CaseOutcome::Failed), Some(&3));

    let reported: Vec<_> = report.results().map(|r| r.id.clone()).collect();
    assert_eq!(reported, ids);

    // Completed runs leave no journal behind
    assert!(!tally.config().journal_path(dir.path()).exists());
}

#[test]
fn run_feeds_history_and_ranking() {
    let dir = project();
    let tally = Tally::with_config(dir.path(), config()).unwrap();
    let inventory = tally.inventory().unwrap();
    let ids: Vec<_> = inventory.ids().cloned().collect();
    tally.run(&ids).unwrap();

    let bad = id(LOGIN_FEATURE, "test_bad_password[1]");
    let good = id(LOGIN_FEATURE, "test_good_password");
    let bad_history = tally.history().history(&bad);
    assert_eq!(bad_history.len(), 1);
    assert_eq!(bad_history[0].outcome, Outcome::Fail);
    assert_eq!(tally.history().history(&good)[0].outcome, Outcome::Pass);

    let ranked = tally.rank(&inventory, None).unwrap();
    let top: Vec<_> = ranked.iter().take(3).map(|(id, _)| id.clone()).collect();
    assert!(top.iter().all(|id| id.as_str().contains("bad_password")));
}

#[test]
fn structured_report_joins_classification_and_score() {
    let dir = project();
    let tally = Tally::with_config(dir.path(), config()).unwrap();
    let inventory = tally.inventory().unwrap();
    let ranked = tally.rank(&inventory, None).unwrap();
    let ids: Vec<_> = ranked.iter().map(|(id, _)| id.clone()).collect();
    let report = tally.run(&ids).unwrap();

    let records = report.records(&inventory, &ranked);
    assert_eq!(records.len(), 7);
    assert!(records.iter().all(|r| r.category.is_some() && r.score.is_some()));

    let json = records_to_json(&records).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    let rows = parsed.as_array().unwrap();
    assert_eq!(rows.len(), 7);
    let query = rows
        .iter()
        .find(|row| row["identifier"] == "tests/integration/test_api.py::test_query")
        .unwrap();
    assert_eq!(query["category"], "integration");
    assert_eq!(query["outcome"], "passed");
}

#[test]
fn output_is_captured_per_batch() {
    let dir = project();
    let tally = Tally::with_config(dir.path(), config()).unwrap();
    let ids = fixture_ids();
    let report = tally.run(&ids).unwrap();

    for batch in report.batches() {
        let capture = batch.capture.as_ref().unwrap();
        assert!(capture.stdout.starts_with(tally.config().capture_dir(dir.path())));
        let stdout = std::fs::read_to_string(&capture.stdout).unwrap();
        assert!(stdout.lines().count() >= batch.results.len());
        let stderr = std::fs::read_to_string(&capture.stderr).unwrap();
        assert_eq!(stderr.trim(), "runner finished");
    }
}

#[test]
fn unknown_identifiers_are_not_reported() {
    let dir = project();
    let mut config = config();
    config.execution.command = vec!["sh".to_string(), "-c".to_string(), "true".to_string()];
    let tally = Tally::with_config(dir.path(), config).unwrap();
    let report = tally.run(&fixture_ids()[..2]).unwrap();
    assert!(report
        .results()
        .all(|r| r.outcome == CaseOutcome::NotReported));
    assert!(tally.history().history(&fixture_ids()[0]).is_empty());
}
