//! Cache reuse, invalidation and persistence

use crate::common::*;
use std::sync::Arc;
use tally::tally_engine::{BuildOutcome, InventoryCache, TallyConfig};
use tally::{Speed, Tally};

#[test]
fn unchanged_tree_is_not_rebuilt() {
    let dir = project();
    let tally = open_in_memory(dir.path());

    let first = tally.inventory().unwrap();
    let second = tally.inventory().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.fingerprint(), second.fingerprint());
    let stats = tally.cache().last_build_stats(dir.path()).unwrap();
    assert_eq!(stats.outcome, BuildOutcome::Unchanged);
    assert_eq!(stats.reparsed, 0);
}

#[test]
fn changing_one_marker_reparses_only_that_file() {
    let dir = project();
    let tally = open_in_memory(dir.path());
    let before = tally.inventory().unwrap();

    write(
        dir.path(),
        STORE_TESTS,
        "import pytest\n\n\n@pytest.mark.medium\nclass TestStore:\n    def test_get(self):\n        assert True\n\n    def test_put(self):\n        assert True\n",
    );
    let after = tally.inventory().unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_ne!(before.fingerprint(), after.fingerprint());

    let stats = tally.cache().last_build_stats(dir.path()).unwrap();
    assert_eq!(stats.outcome, BuildOutcome::Rebuilt);
    assert_eq!(stats.reparsed, 1);
    assert_eq!(stats.reused, 2);

    let get = id(STORE_TESTS, "TestStore::test_get");
    assert_eq!(before.classification(&get).unwrap().speed, Speed::Fast);
    assert_eq!(after.classification(&get).unwrap().speed, Speed::Medium);
}

#[test]
fn persisted_snapshot_survives_reopen() {
    let dir = project();
    let config = TallyConfig::default();

    let first = Tally::with_config(dir.path(), config.clone()).unwrap();
    let built = first.inventory().unwrap();
    assert!(first.cache().snapshot_path(dir.path()).unwrap().exists());
    drop(first);

    let cache = InventoryCache::new(&config);
    let loaded = cache.get_or_build(dir.path()).unwrap();
    assert_eq!(
        cache.last_build_stats(dir.path()).unwrap().outcome,
        BuildOutcome::LoadedFromDisk
    );
    assert_eq!(loaded.fingerprint(), built.fingerprint());
    assert_eq!(
        loaded.ids().collect::<Vec<_>>(),
        built.ids().collect::<Vec<_>>()
    );
}

#[test]
fn broken_feature_file_does_not_hide_siblings() {
    let dir = project();
    write(dir.path(), "tests/behavior/broken.feature", "Scenario: no feature line\n");
    let tally = open_in_memory(dir.path());

    let inventory = tally.inventory().unwrap();
    assert_eq!(inventory.len(), fixture_ids().len());
    assert!(inventory
        .diagnostics()
        .any(|d| d.path == "tests/behavior/broken.feature"));
}
