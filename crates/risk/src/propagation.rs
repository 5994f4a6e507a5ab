//! Dependency propagation
//!
//! A test inherits risk from the components it imports. A component is a
//! module resolved to a repository path; its risk is the larger of its churn
//! and the mean failure rate of the other tests importing it. A test's
//! propagation term is the maximum over its components; its own failures are
//! already counted by the failure term and do not feed back through here.

use crate::churn::ChurnProvider;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tally_core::TestCaseId;
use tally_engine::InventorySnapshot;

/// Maps imported module names to repository paths
#[derive(Debug, Clone, Default)]
pub struct ModuleResolver {
    root: Option<PathBuf>,
}

impl ModuleResolver {
    /// Resolve against files that exist under `root`; other modules
    /// (standard library, third party) are not components.
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        ModuleResolver {
            root: Some(root.into()),
        }
    }

    /// Resolve every module to its first candidate path without checking
    pub fn unchecked() -> Self {
        ModuleResolver { root: None }
    }

    /// Candidate paths of a dotted module name
    pub fn candidates(module: &str) -> Vec<String> {
        let base = module.trim_start_matches('.').replace('.', "/");
        if base.is_empty() {
            return Vec::new();
        }
        vec![
            format!("{}.py", base),
            format!("{}/__init__.py", base),
            format!("src/{}.py", base),
            format!("src/{}/__init__.py", base),
        ]
    }

    /// Repository path of `module`, if it is a component
    pub fn resolve(&self, module: &str) -> Option<String> {
        let candidates = Self::candidates(module);
        match &self.root {
            None => candidates.into_iter().next(),
            Some(root) => candidates.into_iter().find(|c| root.join(c).is_file()),
        }
    }
}

/// Failure rates aggregated per component
#[derive(Debug, Clone, Default)]
pub struct ComponentIndex {
    /// Sum of importer failure rates and number of importers, per path
    failure: BTreeMap<String, (f64, usize)>,
}

impl ComponentIndex {
    /// Aggregate per-test failure rates over the components each test imports
    pub fn build(
        inventory: &InventorySnapshot,
        failure_rates: &BTreeMap<TestCaseId, f64>,
        resolver: &ModuleResolver,
    ) -> Self {
        let mut failure: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for (id, rate) in failure_rates {
            let paths: BTreeSet<String> = inventory
                .imports(id)
                .iter()
                .filter_map(|m| resolver.resolve(m))
                .collect();
            for path in paths {
                let slot = failure.entry(path).or_insert((0.0, 0));
                slot.0 += rate;
                slot.1 += 1;
            }
        }
        ComponentIndex { failure }
    }

    /// Mean failure rate of tests importing the component at `path`,
    /// leaving out one importer whose rate is `own`
    pub fn failure_rate(&self, path: &str, own: Option<f64>) -> f64 {
        let Some(&(sum, count)) = self.failure.get(path) else {
            return 0.0;
        };
        match own {
            None => sum / count as f64,
            Some(_) if count <= 1 => 0.0,
            Some(own) => ((sum - own) / (count - 1) as f64).max(0.0),
        }
    }

    /// Propagation term for a test importing `modules` whose own failure
    /// rate (if it has history) is `own`
    pub fn propagation(
        &self,
        modules: &[String],
        own: Option<f64>,
        resolver: &ModuleResolver,
        churn: Option<&dyn ChurnProvider>,
    ) -> f64 {
        let paths: BTreeSet<String> = modules.iter().filter_map(|m| resolver.resolve(m)).collect();
        paths
            .iter()
            .map(|path| {
                let churn = churn.map_or(0.0, |c| c.churn(path));
                churn.max(self.failure_rate(path, own))
            })
            .fold(0.0, f64::max)
    }
}
