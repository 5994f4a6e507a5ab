//! Inventory snapshots
//!
//! A snapshot is the classified view of one test tree at one fingerprint.
//! It is built once, never mutated, and shared as `Arc<InventorySnapshot>`.

use crate::walk::SourceKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tally_classify::{CaseInfo, Selection};
use tally_core::{Category, Classification, Diagnostic, Speed, TestCaseId, Timestamp};

/// Classification results for one contributing file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Fingerprint the entry was built from
    pub fingerprint: u64,
    /// File kind
    pub kind: SourceKind,
    /// Cases defined by the file
    pub cases: BTreeMap<TestCaseId, CaseInfo>,
    /// Modules the file imports
    pub imports: Vec<String>,
    /// Findings for the file
    pub diagnostics: Vec<Diagnostic>,
}

/// Classified inventory of a test tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    fingerprint: u64,
    built_at: Timestamp,
    files: BTreeMap<String, FileEntry>,
    origins: BTreeMap<TestCaseId, String>,
    diagnostics: Vec<Diagnostic>,
}

impl InventorySnapshot {
    /// Assemble a snapshot from per-file entries
    pub fn new(
        fingerprint: u64,
        files: BTreeMap<String, FileEntry>,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        let origins = files
            .iter()
            .flat_map(|(path, entry)| entry.cases.keys().map(move |id| (id.clone(), path.clone())))
            .collect();
        InventorySnapshot {
            fingerprint,
            built_at: Timestamp::now(),
            files,
            origins,
            diagnostics,
        }
    }

    /// Tree fingerprint the snapshot was built for
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// When the snapshot was built
    pub fn built_at(&self) -> Timestamp {
        self.built_at
    }

    /// Number of test cases
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    /// Whether the tree defines no test case
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// Every identifier, sorted
    pub fn ids(&self) -> impl Iterator<Item = &TestCaseId> {
        self.origins.keys()
    }

    /// Whether `id` is part of the inventory
    pub fn contains(&self, id: &TestCaseId) -> bool {
        self.origins.contains_key(id)
    }

    /// Per-file entries, by relative path
    pub fn files(&self) -> &BTreeMap<String, FileEntry> {
        &self.files
    }

    /// Entry of one file
    pub fn file(&self, path: &str) -> Option<&FileEntry> {
        self.files.get(path)
    }

    /// Path of the file defining `id`
    pub fn origin(&self, id: &TestCaseId) -> Option<&str> {
        self.origins.get(id).map(String::as_str)
    }

    /// Full classification record of `id`
    pub fn case(&self, id: &TestCaseId) -> Option<&CaseInfo> {
        let path = self.origins.get(id)?;
        self.files.get(path)?.cases.get(id)
    }

    /// Category and speed of `id`
    pub fn classification(&self, id: &TestCaseId) -> Option<Classification> {
        self.case(id).map(|c| c.classification)
    }

    /// Complexity estimate of `id`
    pub fn complexity(&self, id: &TestCaseId) -> Option<f64> {
        self.case(id).map(|c| c.complexity)
    }

    /// Modules imported by the file defining `id`
    pub fn imports(&self, id: &TestCaseId) -> &[String] {
        self.origins
            .get(id)
            .and_then(|path| self.files.get(path))
            .map(|entry| entry.imports.as_slice())
            .unwrap_or(&[])
    }

    /// Every case with its classification, grouped by file
    pub fn classifications(&self) -> impl Iterator<Item = (&TestCaseId, &Classification)> {
        self.files
            .values()
            .flat_map(|entry| entry.cases.iter().map(|(id, info)| (id, &info.classification)))
    }

    /// Case count per category
    pub fn counts_by_category(&self) -> BTreeMap<Category, usize> {
        tally_classify::counts_by_category(self.classifications())
    }

    /// Case count per speed
    pub fn counts_by_speed(&self) -> BTreeMap<Speed, usize> {
        tally_classify::counts_by_speed(self.classifications())
    }

    /// Identifiers matching a selection, sorted
    pub fn select(&self, selection: &Selection) -> Vec<TestCaseId> {
        tally_classify::select(self.classifications(), selection)
    }

    /// Snapshot-level and per-file findings
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .chain(self.files.values().flat_map(|e| e.diagnostics.iter()))
    }
}
