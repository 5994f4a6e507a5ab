//! Configuration via `tally.toml`
//!
//! Every section is optional; missing keys take the defaults from
//! [`tally_core::limits`]. On first use a commented default file can be
//! written next to the test tree. Configuration is validated eagerly when it
//! is loaded.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tally_core::limits::{
    DEFAULT_BATCH_SIZE, DEFAULT_BATCH_TIMEOUT_MS, DEFAULT_CANCEL_GRACE_MS, DEFAULT_HALF_LIFE,
    DEFAULT_HISTORY_DEPTH, DEFAULT_MAX_RETRIES, DEFAULT_RISK_THRESHOLD, DEFAULT_WORKERS,
    EXAMPLE_ORDINAL_BASE,
};
use tally_core::{Category, CategoryLayout, Error, Result};
use tally_spec::IdentifierScheme;

/// Config file name placed at the root of the test tree.
pub const CONFIG_FILE_NAME: &str = "tally.toml";

/// Tolerance when checking that scoring weights sum to one
const WEIGHT_EPSILON: f64 = 1e-6;

/// `[identifiers]`: naming scheme of the external framework
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifierConfig {
    /// Ordinal of the first examples row
    pub ordinal_base: usize,
    /// Prefix of generated scenario functions
    pub function_prefix: String,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        IdentifierConfig {
            ordinal_base: EXAMPLE_ORDINAL_BASE,
            function_prefix: "test_".to_string(),
        }
    }
}

impl IdentifierConfig {
    /// The scheme used to generate identifiers
    pub fn scheme(&self) -> IdentifierScheme {
        IdentifierScheme {
            ordinal_base: self.ordinal_base,
            function_prefix: self.function_prefix.clone(),
        }
    }
}

/// One `[[layout.directories]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRule {
    /// Directory prefix, `/`-separated
    pub path: String,
    /// Category of tests under it
    pub category: Category,
}

/// `[layout]`: directory convention for categories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Category when no rule matches
    pub fallback: Category,
    /// Rules, most specific first
    pub directories: Vec<DirectoryRule>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        let layout = CategoryLayout::default();
        LayoutConfig {
            fallback: layout.fallback,
            directories: layout
                .directories
                .into_iter()
                .map(|(path, category)| DirectoryRule { path, category })
                .collect(),
        }
    }
}

impl LayoutConfig {
    /// The layout used for category inference
    pub fn layout(&self) -> CategoryLayout {
        CategoryLayout {
            directories: self
                .directories
                .iter()
                .map(|rule| (rule.path.clone(), rule.category))
                .collect(),
            fallback: self.fallback,
        }
    }
}

/// `[cache]`: discovery and snapshot persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Persist snapshots between processes
    pub persist: bool,
    /// State directory, relative to the test tree root
    pub directory: String,
    /// Directory names never descended into
    pub ignore: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            persist: true,
            directory: ".tally".to_string(),
            ignore: vec![
                "__pycache__".to_string(),
                "node_modules".to_string(),
                "venv".to_string(),
            ],
        }
    }
}

/// `[history]`: execution history retention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Entries kept per test
    pub depth: usize,
    /// History log file, relative to the state directory
    pub file: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig {
            depth: DEFAULT_HISTORY_DEPTH,
            file: "history.log".to_string(),
        }
    }
}

/// `[scoring]`: risk weights and selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Weight of the recency-weighted failure rate
    pub failure_weight: f64,
    /// Weight of code churn
    pub churn_weight: f64,
    /// Weight of structural complexity
    pub complexity_weight: f64,
    /// Weight of dependency propagation
    pub propagation_weight: f64,
    /// Recency half-life, in history entries
    pub half_life: f64,
    /// Score at or above which a test is high risk
    pub threshold: f64,
    /// Size of the prioritized subset, when set
    pub top_n: Option<usize>,
    /// Churn window passed to git (`--since`)
    pub churn_since: Option<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            failure_weight: 0.6,
            churn_weight: 0.2,
            complexity_weight: 0.1,
            propagation_weight: 0.1,
            half_life: DEFAULT_HALF_LIFE,
            threshold: DEFAULT_RISK_THRESHOLD,
            top_n: None,
            churn_since: None,
        }
    }
}

impl ScoringConfig {
    /// Check weights, half-life and threshold
    pub fn validate(&self) -> Result<()> {
        let weights = [
            ("failure_weight", self.failure_weight),
            ("churn_weight", self.churn_weight),
            ("complexity_weight", self.complexity_weight),
            ("propagation_weight", self.propagation_weight),
        ];
        for (name, weight) in weights {
            if !(0.0..=1.0).contains(&weight) {
                return Err(Error::invalid_config(format!(
                    "scoring.{} must be within [0, 1], got {}",
                    name, weight
                )));
            }
        }
        let sum: f64 = weights.iter().map(|(_, w)| w).sum();
        if (sum - 1.0).abs() > WEIGHT_EPSILON {
            return Err(Error::invalid_config(format!(
                "scoring weights must sum to 1, got {}",
                sum
            )));
        }
        if !(self.half_life > 0.0 && self.half_life.is_finite()) {
            return Err(Error::invalid_config(format!(
                "scoring.half_life must be positive, got {}",
                self.half_life
            )));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::invalid_config(format!(
                "scoring.threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// `[execution]`: batches, workers and the external executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Executor command; identifiers are appended
    pub command: Vec<String>,
    /// Maximum tests per batch
    pub batch_size: usize,
    /// Concurrent executor invocations
    pub workers: usize,
    /// Per-batch deadline in milliseconds
    pub timeout_ms: u64,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Time in-flight batches get after cancellation
    pub cancel_grace_ms: u64,
    /// Capture directory, relative to the state directory
    pub capture_dir: String,
    /// Run journal, relative to the state directory
    pub journal: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            command: vec![
                "python".to_string(),
                "-m".to_string(),
                "pytest".to_string(),
                "-rA".to_string(),
                "-p".to_string(),
                "no:cacheprovider".to_string(),
            ],
            batch_size: DEFAULT_BATCH_SIZE,
            workers: DEFAULT_WORKERS,
            timeout_ms: DEFAULT_BATCH_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            cancel_grace_ms: DEFAULT_CANCEL_GRACE_MS,
            capture_dir: "captures".to_string(),
            journal: "run.journal".to_string(),
        }
    }
}

impl ExecutionConfig {
    /// Check pool and batch bounds
    pub fn validate(&self) -> Result<()> {
        if self.command.is_empty() {
            return Err(Error::invalid_config("execution.command must not be empty"));
        }
        if self.workers == 0 {
            return Err(Error::invalid_config("execution.workers must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(Error::invalid_config(
                "execution.batch_size must be at least 1",
            ));
        }
        if self.timeout_ms == 0 {
            return Err(Error::invalid_config(
                "execution.timeout_ms must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Engine configuration loaded from `tally.toml`.
///
/// # Example
///
/// ```toml
/// [scoring]
/// failure_weight = 0.7
/// churn_weight = 0.1
/// complexity_weight = 0.1
/// propagation_weight = 0.1
///
/// [execution]
/// workers = 8
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    /// Identifier scheme
    pub identifiers: IdentifierConfig,
    /// Directory convention
    pub layout: LayoutConfig,
    /// Discovery and persistence
    pub cache: CacheConfig,
    /// History retention
    pub history: HistoryConfig,
    /// Risk scoring
    pub scoring: ScoringConfig,
    /// Batch execution
    pub execution: ExecutionConfig,
}

impl TallyConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Tally configuration

[identifiers]
# Ordinal of the first Scenario Outline example row (pytest-bdd uses 0)
ordinal_base = 0
function_prefix = "test_"

[layout]
# Category for tests outside every listed directory
fallback = "unit"

[[layout.directories]]
path = "tests/unit"
category = "unit"

[[layout.directories]]
path = "tests/integration"
category = "integration"

[[layout.directories]]
path = "tests/behavior"
category = "behavior"

[[layout.directories]]
path = "tests/performance"
category = "performance"

[[layout.directories]]
path = "tests/property"
category = "property"

[cache]
# Keep inventory snapshots in the state directory between runs
persist = true
directory = ".tally"
ignore = ["__pycache__", "node_modules", "venv"]

[history]
# Executions remembered per test
depth = 10
file = "history.log"

[scoring]
# Weights must sum to 1
failure_weight = 0.6
churn_weight = 0.2
complexity_weight = 0.1
propagation_weight = 0.1
# Failure recency half-life, in executions
half_life = 3.0
threshold = 0.7
# top_n = 50
# churn_since = "90 days ago"

[execution]
command = ["python", "-m", "pytest", "-rA", "-p", "no:cacheprovider"]
batch_size = 20
workers = 4
timeout_ms = 300000
max_retries = 2
cancel_grace_ms = 5000
capture_dir = "captures"
journal = "run.journal"
"#
    }

    /// Parse configuration text and validate it
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: TallyConfig = toml::from_str(text)
            .map_err(|e| Error::invalid_config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TallyConfig = toml::from_str(&content).map_err(|e| {
            Error::invalid_config(format!(
                "failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `tally.toml` from `root`, or defaults when there is none
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::serialization(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check every section
    pub fn validate(&self) -> Result<()> {
        if self.history.depth == 0 {
            return Err(Error::invalid_config("history.depth must be at least 1"));
        }
        if self.cache.directory.is_empty() {
            return Err(Error::invalid_config("cache.directory must not be empty"));
        }
        self.scoring.validate()?;
        self.execution.validate()
    }

    /// State directory for a test tree
    pub fn state_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.cache.directory)
    }

    /// History log for a test tree
    pub fn history_path(&self, root: &Path) -> PathBuf {
        self.state_dir(root).join(&self.history.file)
    }

    /// Run journal for a test tree
    pub fn journal_path(&self, root: &Path) -> PathBuf {
        self.state_dir(root).join(&self.execution.journal)
    }

    /// Capture directory for a test tree
    pub fn capture_dir(&self, root: &Path) -> PathBuf {
        self.state_dir(root).join(&self.execution.capture_dir)
    }
}
