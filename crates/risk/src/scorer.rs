//! Risk scoring
//!
//! ```text
//! score = w1 * failure_rate + w2 * churn + w3 * complexity + w4 * propagation
//! ```
//!
//! Every term is clamped to `[0, 1]` and the weights sum to 1, so the score
//! is in `[0, 1]`. The failure rate is recency weighted: the newest entry has
//! weight 1 and weights halve every `half_life` entries. `fail`, `error` and
//! `timeout` all count as failures.
//!
//! Without a churn provider the churn weight is 0 and the other weights are
//! left as configured.

use crate::churn::ChurnProvider;
use crate::propagation::{ComponentIndex, ModuleResolver};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tally_core::{Error, HistoryEntry, Result, TestCaseId};
use tally_durability::HistoryStore;
use tally_engine::{InventorySnapshot, ScoringConfig};
use tracing::debug;

const WEIGHT_EPSILON: f64 = 1e-6;

// ============================================================================
// RiskWeights
// ============================================================================

/// Term weights; validated to sum to 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskWeights {
    /// Recency-weighted failure rate
    pub failure: f64,
    /// Code churn of the test's file
    pub churn: f64,
    /// Structural complexity
    pub complexity: f64,
    /// Dependency propagation
    pub propagation: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        RiskWeights {
            failure: 0.6,
            churn: 0.2,
            complexity: 0.1,
            propagation: 0.1,
        }
    }
}

impl RiskWeights {
    /// Validated weights
    pub fn new(failure: f64, churn: f64, complexity: f64, propagation: f64) -> Result<Self> {
        let weights = RiskWeights {
            failure,
            churn,
            complexity,
            propagation,
        };
        let all = [failure, churn, complexity, propagation];
        if all.iter().any(|w| !(0.0..=1.0).contains(w)) {
            return Err(Error::invalid_config(format!(
                "risk weights must be within [0, 1]: {:?}",
                weights
            )));
        }
        let sum: f64 = all.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_EPSILON {
            return Err(Error::invalid_config(format!(
                "risk weights must sum to 1, got {}",
                sum
            )));
        }
        Ok(weights)
    }

    /// Weights from `[scoring]`
    pub fn from_config(config: &ScoringConfig) -> Result<Self> {
        Self::new(
            config.failure_weight,
            config.churn_weight,
            config.complexity_weight,
            config.propagation_weight,
        )
    }

    /// The same weights with the churn term disabled
    pub fn without_churn(self) -> Self {
        RiskWeights { churn: 0.0, ..self }
    }
}

// ============================================================================
// ScoringContext
// ============================================================================

/// Inputs shared by every score of one ranking
pub struct ScoringContext<'a> {
    /// Classified inventory (complexity, imports)
    pub inventory: &'a InventorySnapshot,
    /// Execution history
    pub history: &'a HistoryStore,
    /// Churn source; `None` disables the churn term
    pub churn: Option<&'a dyn ChurnProvider>,
    /// Module to component resolution
    pub resolver: ModuleResolver,
}

impl<'a> ScoringContext<'a> {
    /// Context without churn, resolving every import
    pub fn new(inventory: &'a InventorySnapshot, history: &'a HistoryStore) -> Self {
        ScoringContext {
            inventory,
            history,
            churn: None,
            resolver: ModuleResolver::unchecked(),
        }
    }

    /// Builder: use a churn provider
    pub fn with_churn(mut self, churn: &'a dyn ChurnProvider) -> Self {
        self.churn = Some(churn);
        self
    }

    /// Builder: resolve imports against files under a repository root
    pub fn with_resolver(mut self, resolver: ModuleResolver) -> Self {
        self.resolver = resolver;
        self
    }
}

// ============================================================================
// RiskScorer
// ============================================================================

/// Per-term view of one score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskBreakdown {
    /// Test case
    pub id: TestCaseId,
    /// Recency-weighted failure rate
    pub failure_rate: f64,
    /// Normalized churn of the test's file
    pub churn: f64,
    /// Complexity estimate
    pub complexity: f64,
    /// Propagated component risk
    pub propagation: f64,
    /// Weighted total
    pub score: f64,
}

/// Multi-factor risk scorer
#[derive(Debug, Clone, PartialEq)]
pub struct RiskScorer {
    weights: RiskWeights,
    half_life: f64,
}

impl Default for RiskScorer {
    fn default() -> Self {
        RiskScorer {
            weights: RiskWeights::default(),
            half_life: tally_core::limits::DEFAULT_HALF_LIFE,
        }
    }
}

impl RiskScorer {
    /// Scorer with validated weights and a positive half-life
    pub fn new(weights: RiskWeights, half_life: f64) -> Result<Self> {
        let weights = RiskWeights::new(
            weights.failure,
            weights.churn,
            weights.complexity,
            weights.propagation,
        )?;
        if !(half_life > 0.0 && half_life.is_finite()) {
            return Err(Error::invalid_config(format!(
                "half-life must be positive, got {}",
                half_life
            )));
        }
        Ok(RiskScorer { weights, half_life })
    }

    /// Scorer from `[scoring]`
    pub fn from_config(config: &ScoringConfig) -> Result<Self> {
        Self::new(RiskWeights::from_config(config)?, config.half_life)
    }

    /// Configured weights
    pub fn weights(&self) -> RiskWeights {
        self.weights
    }

    /// Recency-weighted failure rate of a history ordered oldest first
    pub fn failure_rate(&self, history: &[HistoryEntry]) -> f64 {
        let newest = history.len();
        let mut weighted = 0.0;
        let mut total = 0.0;
        for (position, entry) in history.iter().enumerate() {
            let age = (newest - 1 - position) as f64;
            let weight = 0.5f64.powf(age / self.half_life);
            total += weight;
            if entry.outcome.is_failure() {
                weighted += weight;
            }
        }
        if total == 0.0 {
            0.0
        } else {
            clamp_unit(weighted / total)
        }
    }

    /// Score one test from its inputs
    pub fn score(
        &self,
        id: &TestCaseId,
        history: &[HistoryEntry],
        churn: f64,
        complexity: f64,
        propagation: f64,
    ) -> f64 {
        let failure_rate = self.failure_rate(history);
        let score = combine(&self.weights, failure_rate, churn, complexity, propagation);
        debug!(target: "tally::risk", id = %id, failure_rate, score, "Scored test");
        score
    }

    /// Per-term scores, highest first, ties by identifier
    pub fn explain_all<'i, I>(&self, ids: I, ctx: &ScoringContext<'_>) -> Vec<RiskBreakdown>
    where
        I: IntoIterator<Item = &'i TestCaseId>,
    {
        let weights = match ctx.churn {
            Some(_) => self.weights,
            None => self.weights.without_churn(),
        };

        let mut failure_rates = BTreeMap::new();
        for id in ctx.inventory.ids() {
            failure_rates.insert(id.clone(), self.failure_rate(&ctx.history.history(id)));
        }
        let index = ComponentIndex::build(ctx.inventory, &failure_rates, &ctx.resolver);

        let mut breakdowns: Vec<RiskBreakdown> = ids
            .into_iter()
            .map(|id| {
                let failure_rate = failure_rates
                    .get(id)
                    .copied()
                    .unwrap_or_else(|| self.failure_rate(&ctx.history.history(id)));
                let churn = ctx
                    .churn
                    .zip(ctx.inventory.origin(id))
                    .map_or(0.0, |(provider, path)| provider.churn(path));
                let complexity = ctx.inventory.complexity(id).unwrap_or(0.0);
                let propagation = index.propagation(
                    ctx.inventory.imports(id),
                    failure_rates.get(id).copied(),
                    &ctx.resolver,
                    ctx.churn,
                );
                RiskBreakdown {
                    id: id.clone(),
                    failure_rate,
                    churn: clamp_unit(churn),
                    complexity: clamp_unit(complexity),
                    propagation: clamp_unit(propagation),
                    score: combine(&weights, failure_rate, churn, complexity, propagation),
                }
            })
            .collect();
        breakdowns.sort_by(|a, b| rank_order((&a.id, a.score), (&b.id, b.score)));

        debug!(
            target: "tally::risk",
            tests = breakdowns.len(),
            churn = ctx.churn.map_or("none", |c| c.name()),
            "Ranked tests by risk"
        );
        breakdowns
    }

    /// Scores, highest first, ties by identifier
    pub fn score_all<'i, I>(&self, ids: I, ctx: &ScoringContext<'_>) -> Vec<(TestCaseId, f64)>
    where
        I: IntoIterator<Item = &'i TestCaseId>,
    {
        self.explain_all(ids, ctx)
            .into_iter()
            .map(|b| (b.id, b.score))
            .collect()
    }
}

fn combine(
    weights: &RiskWeights,
    failure_rate: f64,
    churn: f64,
    complexity: f64,
    propagation: f64,
) -> f64 {
    let score = weights.failure * clamp_unit(failure_rate)
        + weights.churn * clamp_unit(churn)
        + weights.complexity * clamp_unit(complexity)
        + weights.propagation * clamp_unit(propagation);
    clamp_unit(score)
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn rank_order(a: (&TestCaseId, f64), b: (&TestCaseId, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0))
}

// ============================================================================
// Selection
// ============================================================================

/// The `n` highest-ranked tests
pub fn select_top(ranked: &[(TestCaseId, f64)], n: usize) -> Vec<TestCaseId> {
    ranked.iter().take(n).map(|(id, _)| id.clone()).collect()
}

/// Tests scoring at or above `threshold`, in rank order
pub fn select_above(ranked: &[(TestCaseId, f64)], threshold: f64) -> Vec<TestCaseId> {
    ranked
        .iter()
        .filter(|(_, score)| *score >= threshold)
        .map(|(id, _)| id.clone())
        .collect()
}

/// Apply `[scoring]` selection: threshold, then `top_n` when set
pub fn prioritize(ranked: &[(TestCaseId, f64)], config: &ScoringConfig) -> Vec<TestCaseId> {
    let above = select_above(ranked, config.threshold);
    match config.top_n {
        Some(n) => above.into_iter().take(n).collect(),
        None => above,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::churn::StaticChurn;
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use tally_classify::CaseInfo;
    use tally_core::{Category, Classification, Outcome, Speed, Timestamp};
    use tally_engine::{FileEntry, SourceKind};

    fn entry(outcome: Outcome) -> HistoryEntry {
        HistoryEntry {
            outcome,
            duration_ms: 5,
            at: Timestamp::EPOCH,
        }
    }

    fn outcome_strategy() -> impl Strategy<Value = Outcome> {
        prop_oneof![
            Just(Outcome::Pass),
            Just(Outcome::Fail),
            Just(Outcome::Error),
            Just(Outcome::Timeout),
        ]
    }

    fn inventory() -> InventorySnapshot {
        let mut files = BTreeMap::new();
        for (path, complexity, imports) in [
            ("tests/unit/test_db.py", 0.5, vec!["app.db".to_string()]),
            ("tests/unit/test_ui.py", 0.1, vec!["app.ui".to_string()]),
        ] {
            let mut cases = BTreeMap::new();
            cases.insert(
                TestCaseId::new(format!("{}::test_x", path)),
                CaseInfo {
                    classification: Classification::new(Category::Unit, Speed::Fast),
                    complexity,
                    line: 1,
                    markers: Vec::new(),
                },
            );
            files.insert(
                path.to_string(),
                FileEntry {
                    fingerprint: 0,
                    kind: SourceKind::Python,
                    cases,
                    imports,
                    diagnostics: Vec::new(),
                },
            );
        }
        InventorySnapshot::new(1, files, Vec::new())
    }

    #[test]
    fn test_weights_validation() {
        assert!(RiskWeights::new(0.6, 0.2, 0.1, 0.1).is_ok());
        assert!(RiskWeights::new(0.5, 0.2, 0.1, 0.1).is_err());
        assert!(RiskWeights::new(1.2, -0.2, 0.0, 0.0).is_err());
        assert!(RiskScorer::new(RiskWeights::default(), 0.0).is_err());
    }

    #[test]
    fn test_failure_rate_recency() {
        let scorer = RiskScorer::default();
        assert_eq!(scorer.failure_rate(&[]), 0.0);
        let recent_fail = [entry(Outcome::Pass), entry(Outcome::Fail)];
        let old_fail = [entry(Outcome::Fail), entry(Outcome::Pass)];
        assert!(scorer.failure_rate(&recent_fail) > scorer.failure_rate(&old_fail));
        assert_eq!(scorer.failure_rate(&[entry(Outcome::Timeout)]), 1.0);

        // Half-life 3: the entry three executions back weighs 0.5.
        let history = [
            entry(Outcome::Fail),
            entry(Outcome::Pass),
            entry(Outcome::Pass),
            entry(Outcome::Pass),
        ];
        let total = 0.5 + 0.5f64.powf(2.0 / 3.0) + 0.5f64.powf(1.0 / 3.0) + 1.0;
        assert!((scorer.failure_rate(&history) - 0.5 / total).abs() < 1e-12);
    }

    #[test]
    fn test_score_formula() {
        let scorer = RiskScorer::default();
        let id = TestCaseId::new("a.py::test_a");
        let score = scorer.score(&id, &[entry(Outcome::Fail)], 0.5, 0.2, 0.0);
        assert!((score - (0.6 + 0.1 + 0.02)).abs() < 1e-12);
        assert_eq!(scorer.score(&id, &[], 5.0, -1.0, f64::NAN), 0.2);
    }

    #[test]
    fn test_score_all_orders_and_degrades_without_churn() {
        let inv = inventory();
        let history = HistoryStore::in_memory(10);
        let db = TestCaseId::new("tests/unit/test_db.py::test_x");
        let ui = TestCaseId::new("tests/unit/test_ui.py::test_x");
        history.append(&db, entry(Outcome::Fail)).unwrap();
        let scorer = RiskScorer::default();

        let ctx = ScoringContext::new(&inv, &history);
        let ranked = scorer.score_all(inv.ids(), &ctx);
        assert_eq!(ranked[0].0, db);
        // failure 0.6 + complexity 0.05; test_db is the only importer of app.db
        assert!((ranked[0].1 - 0.65).abs() < 1e-12);
        assert!((ranked[1].1 - 0.01).abs() < 1e-12);

        let churn = StaticChurn::new().with("tests/unit/test_ui.py", 10, 100);
        let ctx = ScoringContext::new(&inv, &history).with_churn(&churn);
        let ranked = scorer.score_all(inv.ids(), &ctx);
        assert_eq!(ranked[1].0, ui);
        assert!((ranked[1].1 - 0.21).abs() < 1e-12);
    }

    #[test]
    fn test_ties_broken_by_identifier() {
        let inv = inventory();
        let history = HistoryStore::in_memory(10);
        let scorer = RiskScorer::new(RiskWeights::new(1.0, 0.0, 0.0, 0.0).unwrap(), 3.0).unwrap();
        let ranked = scorer.score_all(inv.ids(), &ScoringContext::new(&inv, &history));
        assert_eq!(ranked[0].1, ranked[1].1);
        assert!(ranked[0].0 < ranked[1].0);
    }

    #[test]
    fn test_selection() {
        let ranked = vec![
            (TestCaseId::new("a"), 0.9),
            (TestCaseId::new("b"), 0.7),
            (TestCaseId::new("c"), 0.2),
        ];
        assert_eq!(select_top(&ranked, 2).len(), 2);
        assert_eq!(select_top(&ranked, 10).len(), 3);
        assert_eq!(
            select_above(&ranked, 0.7),
            vec![TestCaseId::new("a"), TestCaseId::new("b")]
        );
        let config = ScoringConfig {
            top_n: Some(1),
            ..ScoringConfig::default()
        };
        assert_eq!(prioritize(&ranked, &config), vec![TestCaseId::new("a")]);
    }

    proptest! {
        #[test]
        fn prop_score_in_unit_interval(
            outcomes in proptest::collection::vec(outcome_strategy(), 0..20),
            churn in -2.0f64..2.0,
            complexity in -2.0f64..2.0,
            propagation in -2.0f64..2.0,
        ) {
            let scorer = RiskScorer::default();
            let history: Vec<HistoryEntry> = outcomes.into_iter().map(entry).collect();
            let score = scorer.score(&TestCaseId::new("p.py::test_p"), &history, churn, complexity, propagation);
            prop_assert!((0.0..=1.0).contains(&score));
        }

        #[test]
        fn prop_recent_failure_never_lowers_score(
            outcomes in proptest::collection::vec(outcome_strategy(), 0..20),
            churn in 0.0f64..1.0,
            complexity in 0.0f64..1.0,
            half_life in 0.5f64..10.0,
        ) {
            let scorer = RiskScorer::new(RiskWeights::default(), half_life).unwrap();
            let id = TestCaseId::new("p.py::test_p");
            let mut history: Vec<HistoryEntry> = outcomes.into_iter().map(entry).collect();
            let before = scorer.score(&id, &history, churn, complexity, 0.0);
            history.push(entry(Outcome::Fail));
            let after = scorer.score(&id, &history, churn, complexity, 0.0);
            prop_assert!(after >= before - 1e-12);
        }
    }
}
