//! Marker resolution across files and selection queries

use crate::common::*;
use std::collections::BTreeSet;
use tally::tally_classify::Selection;
use tally::{Category, Speed};

#[test]
fn class_marker_inherited_unless_method_overrides() {
    let dir = project();
    let tally = open_in_memory(dir.path());
    let inventory = tally.inventory().unwrap();

    let speeds: BTreeSet<Speed> = inventory
        .ids()
        .filter(|id| id.source_path() == STORE_TESTS)
        .map(|id| inventory.classification(id).unwrap().speed)
        .collect();
    assert_eq!(speeds.into_iter().collect::<Vec<_>>(), vec![Speed::Fast, Speed::Slow]);
}

#[test]
fn inventory_matches_fixture_and_categories() {
    let dir = project();
    let tally = open_in_memory(dir.path());
    let inventory = tally.inventory().unwrap();

    assert_eq!(inventory.ids().cloned().collect::<Vec<_>>(), fixture_ids());
    let counts = inventory.counts_by_category();
    assert_eq!(counts.get(&Category::Unit).copied(), Some(2));
    assert_eq!(counts.get(&Category::Integration).copied(), Some(1));
    assert_eq!(counts.get(&Category::Behavior).copied(), Some(4));
}

#[test]
fn outline_tags_apply_to_every_row() {
    let dir = project();
    let tally = open_in_memory(dir.path());
    let inventory = tally.inventory().unwrap();

    for row in 0..3 {
        let id = id(LOGIN_FEATURE, &format!("test_bad_password[{}]", row));
        assert_eq!(inventory.classification(&id).unwrap().speed, Speed::Slow);
    }
    let plain = id(LOGIN_FEATURE, "test_good_password");
    assert_eq!(inventory.classification(&plain).unwrap().speed, Speed::Unmarked);
}

#[test]
fn selection_filters_by_category_and_speed() {
    let dir = project();
    let tally = open_in_memory(dir.path());
    let inventory = tally.inventory().unwrap();

    let slow_behavior = inventory.select(
        &Selection::default()
            .category(Category::Behavior)
            .speed(Speed::Slow),
    );
    assert_eq!(slow_behavior.len(), 3);
    let fast = inventory.select(&Selection::default().speed(Speed::Fast));
    assert_eq!(fast, vec![id(STORE_TESTS, "TestStore::test_get")]);
}
