//! Static identifiers against the framework's dynamic collection

use crate::common::*;
use tally::tally_engine::{parse_collect_output, verify, DynamicRecord};
use tally::Category;

fn collect_output(ids: &[tally::TestCaseId]) -> String {
    let mut out = String::new();
    for id in ids {
        out.push_str(id.as_str());
        out.push('\n');
    }
    out.push_str(&format!("\n{} tests collected in 0.03s\n", ids.len()));
    out
}

#[test]
fn scenario_plus_three_row_outline_yields_four_identifiers() {
    let dir = project();
    let tally = open_in_memory(dir.path());
    let inventory = tally.inventory().unwrap();

    let behavior: Vec<_> = inventory
        .ids()
        .filter(|id| id.source_path() == LOGIN_FEATURE)
        .cloned()
        .collect();
    assert_eq!(behavior.len(), 4);
    assert_eq!(
        inventory.counts_by_category().get(&Category::Behavior).copied(),
        Some(4)
    );
}

#[test]
fn matching_collection_has_zero_delta() {
    let dir = project();
    let tally = open_in_memory(dir.path());
    let inventory = tally.inventory().unwrap();

    let report = tally.verify(&inventory, &collect_output(&fixture_ids()));
    assert!(report.is_consistent(), "{:?}", report);
    assert_eq!(report.total.delta, 0);
    assert_eq!(report.categories[&Category::Behavior].static_count, 4);
    assert_eq!(report.categories[&Category::Behavior].dynamic_count, 4);
}

#[test]
fn missing_example_row_is_reported() {
    let dir = project();
    let tally = open_in_memory(dir.path());
    let inventory = tally.inventory().unwrap();

    let dropped = id(LOGIN_FEATURE, "test_bad_password[2]");
    let dynamic: Vec<_> = fixture_ids().into_iter().filter(|i| *i != dropped).collect();
    let report = tally.verify(&inventory, &collect_output(&dynamic));

    assert!(!report.is_consistent());
    assert_eq!(report.total.delta, -1);
    assert_eq!(report.only_static, vec![dropped]);
    let behavior = report.categories[&Category::Behavior];
    assert_eq!(behavior.delta, -1);
    assert!((behavior.delta_percent + 25.0).abs() < 1e-9);
}

#[test]
fn unknown_dynamic_identifier_categorized_by_directory() {
    let dir = project();
    let tally = open_in_memory(dir.path());
    let inventory = tally.inventory().unwrap();

    let mut dynamic: Vec<DynamicRecord> = fixture_ids().into_iter().map(DynamicRecord::new).collect();
    dynamic.push(DynamicRecord::new("tests/integration/test_generated.py::test_dyn"));
    let report = verify(&inventory, &dynamic);

    assert_eq!(report.only_dynamic.len(), 1);
    assert_eq!(report.categories[&Category::Integration].delta, 1);
}

#[test]
fn collect_output_summary_lines_ignored() {
    let text = "\
tests/unit/test_store.py::TestStore::test_get
tests/unit/test_store.py::TestStore::test_put

========================== warnings summary ==========================
tests/unit/test_store.py: 1 warning
2 tests collected in 0.01s
";
    assert_eq!(parse_collect_output(text).len(), 2);
}
