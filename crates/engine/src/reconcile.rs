//! Static versus dynamic inventory reconciliation
//!
//! The static side is an [`InventorySnapshot`]; the dynamic side is what the
//! external framework reports when it collects the same tree. A mismatch is a
//! finding in the returned report, never an error.

use crate::inventory::InventorySnapshot;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tally_core::{Category, CategoryLayout, Speed, TestCaseId};

/// One test case reported by the external framework
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicRecord {
    /// Node id as printed by the framework
    pub id: TestCaseId,
    /// Marker names, when the framework reported them
    pub markers: Option<Vec<String>>,
}

impl DynamicRecord {
    /// Record without marker information
    pub fn new(id: impl Into<TestCaseId>) -> Self {
        DynamicRecord {
            id: id.into(),
            markers: None,
        }
    }

    /// Record with marker names
    pub fn with_markers(id: impl Into<TestCaseId>, markers: Vec<String>) -> Self {
        DynamicRecord {
            id: id.into(),
            markers: Some(markers),
        }
    }
}

/// Static and dynamic counts for one key
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountDelta {
    /// Cases in the static inventory
    pub static_count: usize,
    /// Cases the framework reported
    pub dynamic_count: usize,
    /// `dynamic - static`
    pub delta: i64,
    /// Delta relative to the static count, in percent
    pub delta_percent: f64,
}

impl CountDelta {
    fn new(static_count: usize, dynamic_count: usize) -> Self {
        let delta = dynamic_count as i64 - static_count as i64;
        let delta_percent = match (static_count, dynamic_count) {
            (0, 0) => 0.0,
            (0, _) => 100.0,
            (s, _) => delta as f64 / s as f64 * 100.0,
        };
        CountDelta {
            static_count,
            dynamic_count,
            delta,
            delta_percent,
        }
    }
}

/// Result of reconciling the two inventories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancyReport {
    /// Counts per category, every category present
    pub categories: BTreeMap<Category, CountDelta>,
    /// Counts per speed, when the dynamic side reported markers
    pub speeds: Option<BTreeMap<Speed, CountDelta>>,
    /// Identifiers only the static inventory knows, sorted
    pub only_static: Vec<TestCaseId>,
    /// Identifiers only the framework reported, sorted
    pub only_dynamic: Vec<TestCaseId>,
    /// Totals
    pub total: CountDelta,
}

impl DiscrepancyReport {
    /// No delta anywhere and identical identifier sets
    pub fn is_consistent(&self) -> bool {
        self.only_static.is_empty()
            && self.only_dynamic.is_empty()
            && self.total.delta == 0
            && self.categories.values().all(|c| c.delta == 0)
            && self
                .speeds
                .as_ref()
                .map_or(true, |s| s.values().all(|c| c.delta == 0))
    }
}

/// Reconcile using the default directory layout
pub fn verify(inventory: &InventorySnapshot, dynamic: &[DynamicRecord]) -> DiscrepancyReport {
    verify_with(inventory, dynamic, &CategoryLayout::default())
}

/// Reconcile, categorizing unknown dynamic identifiers with `layout`
pub fn verify_with(
    inventory: &InventorySnapshot,
    dynamic: &[DynamicRecord],
    layout: &CategoryLayout,
) -> DiscrepancyReport {
    let mut static_categories: BTreeMap<Category, usize> =
        Category::ALL.iter().map(|c| (*c, 0)).collect();
    let mut static_speeds: BTreeMap<Speed, usize> = Speed::ALL.iter().map(|s| (*s, 0)).collect();
    for (_, classification) in inventory.classifications() {
        *static_categories.entry(classification.category).or_default() += 1;
        *static_speeds.entry(classification.speed).or_default() += 1;
    }

    let mut seen = HashSet::new();
    let mut dynamic_ids = BTreeSet::new();
    let mut dynamic_categories: BTreeMap<Category, usize> =
        Category::ALL.iter().map(|c| (*c, 0)).collect();
    let mut dynamic_speeds: BTreeMap<Speed, usize> = Speed::ALL.iter().map(|s| (*s, 0)).collect();
    let reports_markers = dynamic.iter().any(|r| r.markers.is_some());

    for record in dynamic {
        if !seen.insert(&record.id) {
            continue;
        }
        dynamic_ids.insert(record.id.clone());
        let category = match inventory.classification(&record.id) {
            Some(c) => c.category,
            None => dynamic_category(record, layout),
        };
        *dynamic_categories.entry(category).or_default() += 1;
        let speed = record
            .markers
            .as_ref()
            .and_then(|m| m.iter().find_map(|name| Speed::from_marker(name)))
            .unwrap_or(Speed::Unmarked);
        *dynamic_speeds.entry(speed).or_default() += 1;
    }

    let only_static = inventory
        .ids()
        .filter(|id| !dynamic_ids.contains(*id))
        .cloned()
        .collect();
    let only_dynamic = dynamic_ids
        .iter()
        .filter(|id| !inventory.contains(id))
        .cloned()
        .collect();

    let categories = Category::ALL
        .iter()
        .map(|c| (*c, CountDelta::new(static_categories[c], dynamic_categories[c])))
        .collect();
    let speeds = reports_markers.then(|| {
        Speed::ALL
            .iter()
            .map(|s| (*s, CountDelta::new(static_speeds[s], dynamic_speeds[s])))
            .collect()
    });

    DiscrepancyReport {
        categories,
        speeds,
        only_static,
        only_dynamic,
        total: CountDelta::new(inventory.len(), dynamic_ids.len()),
    }
}

fn dynamic_category(record: &DynamicRecord, layout: &CategoryLayout) -> Category {
    record
        .markers
        .as_ref()
        .and_then(|m| m.iter().find_map(|name| Category::from_marker(name)))
        .or_else(|| layout.infer(record.id.source_path()))
        .unwrap_or(layout.fallback)
}

/// Parse `pytest --collect-only -q` output.
///
/// Node id lines are kept in order without duplicates. Section banners
/// (`===`), indented detail lines, blank lines and the summary line are
/// ignored. Collection stops at the first banner after ids were seen, which
/// keeps the warnings summary from being read as collected ids.
pub fn parse_collect_output(text: &str) -> Vec<DynamicRecord> {
    let mut records = Vec::new();
    let mut seen = HashSet::new();
    for line in text.lines() {
        if line.starts_with('=') {
            if records.is_empty() {
                continue;
            }
            break;
        }
        if line.is_empty() || line.starts_with(char::is_whitespace) {
            continue;
        }
        let id = line.trim_end();
        if !id.contains("::") {
            continue;
        }
        if seen.insert(id.to_string()) {
            records.push(DynamicRecord::new(id));
        }
    }
    records
}
