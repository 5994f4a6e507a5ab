//! Queries over classified cases

use std::collections::BTreeMap;
use tally_core::{Category, Classification, Speed, TestCaseId};

/// Count cases per category. Every category is present, possibly with 0.
pub fn counts_by_category<'a, I>(cases: I) -> BTreeMap<Category, usize>
where
    I: IntoIterator<Item = (&'a TestCaseId, &'a Classification)>,
{
    let mut counts: BTreeMap<Category, usize> = Category::ALL.iter().map(|c| (*c, 0)).collect();
    for (_, classification) in cases {
        *counts.entry(classification.category).or_default() += 1;
    }
    counts
}

/// Count cases per speed. Every speed is present, possibly with 0.
pub fn counts_by_speed<'a, I>(cases: I) -> BTreeMap<Speed, usize>
where
    I: IntoIterator<Item = (&'a TestCaseId, &'a Classification)>,
{
    let mut counts: BTreeMap<Speed, usize> = Speed::ALL.iter().map(|s| (*s, 0)).collect();
    for (_, classification) in cases {
        *counts.entry(classification.speed).or_default() += 1;
    }
    counts
}

/// Case filter. Empty lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Accepted categories
    pub categories: Vec<Category>,
    /// Accepted speeds
    pub speeds: Vec<Speed>,
    /// Accepted source path prefixes
    pub paths: Vec<String>,
}

impl Selection {
    /// Restrict to `category`
    pub fn category(mut self, category: Category) -> Self {
        self.categories.push(category);
        self
    }

    /// Restrict to `speed`
    pub fn speed(mut self, speed: Speed) -> Self {
        self.speeds.push(speed);
        self
    }

    /// Restrict to sources under `prefix`
    pub fn path(mut self, prefix: impl Into<String>) -> Self {
        self.paths.push(prefix.into());
        self
    }

    /// Whether a case passes the filter
    pub fn matches(&self, id: &TestCaseId, classification: &Classification) -> bool {
        (self.categories.is_empty() || self.categories.contains(&classification.category))
            && (self.speeds.is_empty() || self.speeds.contains(&classification.speed))
            && (self.paths.is_empty()
                || self
                    .paths
                    .iter()
                    .any(|p| id.source_path().starts_with(p.as_str())))
    }
}

/// Identifiers passing `selection`, sorted
pub fn select<'a, I>(cases: I, selection: &Selection) -> Vec<TestCaseId>
where
    I: IntoIterator<Item = (&'a TestCaseId, &'a Classification)>,
{
    let mut ids: Vec<TestCaseId> = cases
        .into_iter()
        .filter(|(id, c)| selection.matches(id, c))
        .map(|(id, _)| id.clone())
        .collect();
    ids.sort();
    ids
}
