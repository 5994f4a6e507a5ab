//! Risk ranking from recorded history

use crate::common::*;
use proptest::prelude::*;
use tally::tally_risk::{select_above, select_top, StaticChurn};
use tally::{HistoryEntry, Outcome, TestCaseId};

fn record(tally: &tally::Tally, id: &TestCaseId, outcomes: &[Outcome]) {
    for outcome in outcomes {
        tally
            .history()
            .append(id, HistoryEntry::now(*outcome, 10))
            .unwrap();
    }
}

#[test]
fn recent_failures_rank_first() {
    let dir = project();
    let tally = open_in_memory(dir.path());
    let inventory = tally.inventory().unwrap();

    let flaky = id(STORE_TESTS, "TestStore::test_put");
    let recovered = id(STORE_TESTS, "TestStore::test_get");
    record(&tally, &flaky, &[Outcome::Pass, Outcome::Pass, Outcome::Fail]);
    record(&tally, &recovered, &[Outcome::Fail, Outcome::Pass, Outcome::Pass]);

    let ranked = tally.rank(&inventory, None).unwrap();
    assert_eq!(ranked.len(), inventory.len());
    assert_eq!(ranked[0].0, flaky);
    assert!(ranked[0].1 > ranked[1].1);
    let position = |id: &TestCaseId| ranked.iter().position(|(r, _)| r == id).unwrap();
    assert!(position(&flaky) < position(&recovered));
    assert!(ranked.windows(2).all(|w| w[0].1 > w[1].1 || (w[0].1 == w[1].1 && w[0].0 < w[1].0)));
}

#[test]
fn failing_component_propagates_to_importers() {
    let dir = project();
    let pool_tests = "tests/integration/test_pool.py";
    write(
        dir.path(),
        pool_tests,
        "from app.db import connect\n\n\ndef test_pool():\n    assert connect()\n",
    );
    let tally = open_in_memory(dir.path());
    let inventory = tally.inventory().unwrap();

    let query = id(API_TESTS, "test_query");
    let pool = id(pool_tests, "test_pool");
    record(&tally, &query, &[Outcome::Timeout]);
    let ranked = tally.rank(&inventory, None).unwrap();
    let score = |target: &TestCaseId| ranked.iter().find(|(id, _)| id == target).unwrap().1;

    // test_pool inherits the failures of app/db.py through test_query
    let complexity = inventory.complexity(&pool).unwrap();
    assert!((score(&pool) - (0.1 + 0.1 * complexity)).abs() < 1e-9);

    // test_query's own failures are not counted twice
    let complexity = inventory.complexity(&query).unwrap();
    assert!((score(&query) - (0.6 + 0.1 * complexity)).abs() < 1e-9);
}

#[test]
fn churn_raises_scores_of_changed_files() {
    let dir = project();
    let tally = open_in_memory(dir.path());
    let inventory = tally.inventory().unwrap();

    let without = tally.rank(&inventory, None).unwrap();
    let churn = StaticChurn::new().with(LOGIN_FEATURE, 10, 100);
    let with = tally.rank(&inventory, Some(&churn)).unwrap();

    let top: Vec<&str> = with.iter().take(4).map(|(id, _)| id.source_path()).collect();
    assert!(top.iter().all(|path| *path == LOGIN_FEATURE));
    let behavior = id(LOGIN_FEATURE, "test_good_password");
    let before = without.iter().find(|(id, _)| *id == behavior).unwrap().1;
    let after = with.iter().find(|(id, _)| *id == behavior).unwrap().1;
    assert!((after - before - 0.2).abs() < 1e-9);
}

#[test]
fn prioritized_subset_uses_threshold_and_top_n() {
    let dir = project();
    let mut config = memory_config();
    config.scoring.threshold = 0.5;
    config.scoring.top_n = Some(1);
    let tally = tally::Tally::with_config(dir.path(), config).unwrap();
    let inventory = tally.inventory().unwrap();

    let a = id(STORE_TESTS, "TestStore::test_get");
    let b = id(STORE_TESTS, "TestStore::test_put");
    record(&tally, &a, &[Outcome::Fail]);
    record(&tally, &b, &[Outcome::Error]);

    let ranked = tally.rank(&inventory, None).unwrap();
    assert_eq!(select_above(&ranked, 0.5).len(), 2);
    assert_eq!(select_top(&ranked, 3).len(), 3);
    let chosen = tally.prioritize(&ranked);
    assert_eq!(chosen.len(), 1);
    assert_eq!(chosen[0], ranked[0].0);
}

fn outcome() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        Just(Outcome::Pass),
        Just(Outcome::Fail),
        Just(Outcome::Error),
        Just(Outcome::Timeout),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn ranked_scores_stay_in_unit_interval(
        histories in proptest::collection::vec(proptest::collection::vec(outcome(), 0..12), 7),
    ) {
        let dir = project();
        let tally = open_in_memory(dir.path());
        let inventory = tally.inventory().unwrap();
        for (id, outcomes) in fixture_ids().iter().zip(&histories) {
            record(&tally, id, outcomes);
        }
        let ranked = tally.rank(&inventory, None).unwrap();
        prop_assert_eq!(ranked.len(), 7);
        prop_assert!(ranked.iter().all(|(_, s)| (0.0..=1.0).contains(s)));
    }
}
