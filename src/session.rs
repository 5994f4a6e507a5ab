//! Project-level entry point

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tally_core::{Result, TestCaseId};
use tally_durability::HistoryStore;
use tally_engine::{
    parse_collect_output, verify_with, DiscrepancyReport, InventoryCache, InventorySnapshot,
    TallyConfig,
};
use tally_executor::{AggregatedReport, Scheduler};
use tally_risk::{prioritize, ChurnProvider, GitChurn, ModuleResolver, RiskScorer, ScoringContext};
use tracing::info;

/// One project root with its configuration, inventory cache and history.
///
/// # Thread Safety
///
/// `Tally` is `Send + Sync`; the cache and history store handle their own
/// locking.
pub struct Tally {
    root: PathBuf,
    config: TallyConfig,
    cache: InventoryCache,
    history: Arc<HistoryStore>,
}

impl Tally {
    /// Open `root` with its `tally.toml`, or defaults when there is none
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let config = TallyConfig::load(root)?;
        Self::with_config(root, config)
    }

    /// Open `root` with an explicit configuration.
    ///
    /// History is persisted under the state directory when caching is
    /// persistent, and kept in memory otherwise.
    pub fn with_config(root: impl Into<PathBuf>, config: TallyConfig) -> Result<Self> {
        let root = root.into();
        config.validate()?;
        let history = if config.cache.persist {
            HistoryStore::open(config.history_path(&root), config.history.depth)?
        } else {
            HistoryStore::in_memory(config.history.depth)
        };
        info!(
            target: "tally::cache",
            root = %root.display(),
            persist = config.cache.persist,
            "Opened project"
        );
        Ok(Tally {
            cache: InventoryCache::new(&config),
            history: Arc::new(history),
            root,
            config,
        })
    }

    /// Project root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Active configuration
    pub fn config(&self) -> &TallyConfig {
        &self.config
    }

    /// Inventory cache
    pub fn cache(&self) -> &InventoryCache {
        &self.cache
    }

    /// Execution history
    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Current inventory, rebuilt if any source file changed
    pub fn inventory(&self) -> Result<Arc<InventorySnapshot>> {
        self.cache.get_or_build(&self.root)
    }

    /// Git churn for the project, limited by `scoring.churn_since`
    pub fn git_churn(&self) -> GitChurn {
        let churn = GitChurn::new(&self.root);
        match &self.config.scoring.churn_since {
            Some(since) => churn.since(since.clone()),
            None => churn,
        }
    }

    /// Every test of `inventory`, highest risk first
    pub fn rank(
        &self,
        inventory: &InventorySnapshot,
        churn: Option<&dyn ChurnProvider>,
    ) -> Result<Vec<(TestCaseId, f64)>> {
        let scorer = RiskScorer::from_config(&self.config.scoring)?;
        let mut ctx = ScoringContext::new(inventory, &self.history)
            .with_resolver(ModuleResolver::rooted(&self.root));
        if let Some(churn) = churn {
            ctx = ctx.with_churn(churn);
        }
        Ok(scorer.score_all(inventory.ids(), &ctx))
    }

    /// High-risk subset of a ranking per `[scoring]` threshold and top-N
    pub fn prioritize(&self, ranked: &[(TestCaseId, f64)]) -> Vec<TestCaseId> {
        prioritize(ranked, &self.config.scoring)
    }

    /// Subprocess scheduler that journals runs and records history
    pub fn scheduler(&self) -> Result<Scheduler> {
        Ok(Scheduler::from_config(&self.config, &self.root)?.with_history(Arc::clone(&self.history)))
    }

    /// Execute `tests` with the configured executor
    pub fn run(&self, tests: &[TestCaseId]) -> Result<AggregatedReport> {
        self.scheduler()?.run(tests)
    }

    /// Reconcile `inventory` against `pytest --collect-only -q` output
    pub fn verify(&self, inventory: &InventorySnapshot, collect_output: &str) -> DiscrepancyReport {
        let dynamic = parse_collect_output(collect_output);
        verify_with(inventory, &dynamic, &self.config.layout.layout())
    }
}
