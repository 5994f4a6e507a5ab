//! Shared fixtures for the integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::path::Path;
use std::sync::Once;
use tally::tally_engine::TallyConfig;
use tally::{Tally, TestCaseId};
use tempfile::TempDir;

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route logs to the test harness (shown with `--nocapture`).
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

// ============================================================================
// Fixture project
// ============================================================================

pub const LOGIN_FEATURE: &str = "tests/behavior/login.feature";
pub const STORE_TESTS: &str = "tests/unit/test_store.py";
pub const API_TESTS: &str = "tests/integration/test_api.py";

const LOGIN: &str = r#"@behavior
Feature: Login

  Scenario: Good password
    Given a registered user
    When they log in with the right password
    Then they see the dashboard

  @slow
  Scenario Outline: Bad password
    Given a registered user
    When they log in with "<password>"
    Then they see "<message>"

    Examples:
      | password | message   |
      | short    | too short |
      | wrong    | invalid   |
      | blank    | required  |
"#;

const STORE: &str = r#"import pytest


@pytest.mark.slow
class TestStore:
    @pytest.mark.fast
    def test_get(self):
        assert True

    def test_put(self):
        assert True
"#;

const API: &str = r#"import pytest
from app.db import connect


@pytest.mark.integration
def test_query():
    db = connect()
    assert db
    assert db.query()
"#;

/// Write `text` to `rel` under `root`, creating directories
pub fn write(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, text).unwrap();
}

/// A project with one feature file (1 scenario + 1 outline with 3 rows),
/// one unit test module and one integration test importing `app.db`
pub fn project() -> TempDir {
    init_tracing();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    write(dir.path(), LOGIN_FEATURE, LOGIN);
    write(dir.path(), STORE_TESTS, STORE);
    write(dir.path(), API_TESTS, API);
    write(dir.path(), "app/__init__.py", "");
    write(dir.path(), "app/db.py", "def connect():\n    return object()\n");
    dir
}

/// Config that keeps everything in memory
pub fn memory_config() -> TallyConfig {
    let mut config = TallyConfig::default();
    config.cache.persist = false;
    config
}

/// Open the fixture project without persistence
pub fn open_in_memory(root: &Path) -> Tally {
    Tally::with_config(root, memory_config()).expect("Failed to open project")
}

/// Identifier under `path`
pub fn id(path: &str, name: &str) -> TestCaseId {
    TestCaseId::new(format!("{}::{}", path, name))
}

/// Every identifier of the fixture project, sorted
pub fn fixture_ids() -> Vec<TestCaseId> {
    let mut ids = vec![
        id(LOGIN_FEATURE, "test_good_password"),
        id(LOGIN_FEATURE, "test_bad_password[0]"),
        id(LOGIN_FEATURE, "test_bad_password[1]"),
        id(LOGIN_FEATURE, "test_bad_password[2]"),
        id(STORE_TESTS, "TestStore::test_get"),
        id(STORE_TESTS, "TestStore::test_put"),
        id(API_TESTS, "test_query"),
    ];
    ids.sort();
    ids
}
